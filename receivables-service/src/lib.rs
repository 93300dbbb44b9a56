pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::middleware::from_fn;
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use config::Config;
use services::Database;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: Database,
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;

        db.run_migrations().await?;

        let state = AppState {
            config: config.clone(),
            db,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics_endpoint))
            // Program catalog
            .route("/programs", post(handlers::programs::create_program))
            .route("/programs", get(handlers::programs::list_programs))
            .route("/programs/:id", get(handlers::programs::get_program))
            // Enrollment ledger
            .route(
                "/enrollments",
                post(handlers::enrollments::create_enrollment),
            )
            .route("/enrollments", get(handlers::enrollments::list_enrollments))
            .route(
                "/enrollments/:id",
                get(handlers::enrollments::get_enrollment),
            )
            .route(
                "/enrollments/:id",
                delete(handlers::enrollments::delete_enrollment),
            )
            .route(
                "/enrollments/:id/commitments",
                get(handlers::commitments::list_commitments),
            )
            // Payment recorder
            .route("/payments", post(handlers::payments::register_payment))
            .route("/payments", get(handlers::payments::list_payments))
            .route("/payments/:id", get(handlers::payments::get_payment))
            .route("/payments/:id", patch(handlers::payments::correct_payment))
            .route(
                "/payments/:id/receipt",
                post(handlers::receipts::issue_receipt),
            )
            // Commitment scheduler
            .route(
                "/commitments/:id",
                get(handlers::commitments::get_commitment),
            )
            .route(
                "/commitments/:id/reschedule",
                post(handlers::commitments::reschedule_commitment),
            )
            // Aging and alerts
            .route("/alerts/aging", get(handlers::alerts::aging_report))
            // Receipt delivery
            .route(
                "/receipts/:id/sent",
                post(handlers::receipts::mark_receipt_sent),
            )
            .layer(from_fn(middleware::error_counter_middleware))
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state);

        // Port 0 binds a random free port, used by the test harness.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), AppError> {
        tracing::info!("Listening on port {}", self.port);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
