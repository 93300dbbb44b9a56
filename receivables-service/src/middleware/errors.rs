//! Error counting on the response path.

use axum::{extract::Request, middleware::Next, response::Response};

use crate::services::metrics::ERRORS_TOTAL;

fn error_type(status: u16) -> Option<&'static str> {
    match status {
        400 => Some("bad_request"),
        404 => Some("not_found"),
        409 => Some("conflict"),
        422 => Some("validation"),
        500 => Some("internal"),
        503 => Some("unavailable"),
        400..=599 => Some("other"),
        _ => None,
    }
}

pub async fn error_counter_middleware(req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    if let Some(error_type) = error_type(response.status().as_u16()) {
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();
    }

    response
}
