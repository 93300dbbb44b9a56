//! Common test utilities for receivables-service integration tests.

use receivables_service::config::{Config, DatabaseConfig, ServerConfig};
use receivables_service::Application;
use secrecy::Secret;
use serde_json::{json, Value};
use std::sync::Once;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,receivables_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub tenant_id: Uuid,
}

impl TestApp {
    /// Spawn a test application against TEST_DATABASE_URL. Returns
    /// None when the variable is unset so the suite can pass without a
    /// database; use scripts/integ-tests.sh to run the full set.
    pub async fn try_spawn() -> Option<Self> {
        init_tracing();

        let database_url = std::env::var("TEST_DATABASE_URL").ok()?;

        receivables_service::services::init_metrics();

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: Secret::new(database_url),
                max_connections: 2,
                min_connections: 1,
            },
            service_name: "receivables-service-test".to_string(),
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to come up.
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        let mut attempts = 0;
        loop {
            match client.get(&health_url).send().await {
                Ok(_) => break,
                Err(_) if attempts < 20 => {
                    attempts += 1;
                    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
                }
                Err(e) => panic!("Server never became healthy: {}", e),
            }
        }

        // Each test gets its own tenant, so a shared database is fine.
        Some(TestApp {
            address,
            client,
            tenant_id: Uuid::new_v4(),
        })
    }

    pub async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .header("X-Tenant-ID", self.tenant_id.to_string())
            .header("X-User-ID", "test_user")
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .header("X-Tenant-ID", self.tenant_id.to_string())
            .header("X-User-ID", "test_user")
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn patch(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .patch(format!("{}{}", self.address, path))
            .header("X-Tenant-ID", self.tenant_id.to_string())
            .header("X-User-ID", "test_user")
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{}", self.address, path))
            .header("X-Tenant-ID", self.tenant_id.to_string())
            .header("X-User-ID", "test_user")
            .send()
            .await
            .expect("Request failed")
    }

    /// Create a program and return its JSON representation.
    pub async fn create_program(&self, name: &str, total_value: &str, modules: i32) -> Value {
        let response = self
            .post(
                "/programs",
                &json!({
                    "name": name,
                    "total_value": total_value,
                    "modules_count": modules
                }),
            )
            .await;
        assert_eq!(response.status(), 201, "Failed to create program");
        response.json().await.expect("Invalid program JSON")
    }

    /// Enroll a student with a matricula payment. Returns the full
    /// CreateEnrollmentResponse JSON.
    pub async fn create_enrollment(
        &self,
        program_id: &str,
        student_name: &str,
        matricula_amount: &str,
        payment_date: &str,
        frequency: &str,
    ) -> Value {
        let response = self
            .post(
                "/enrollments",
                &json!({
                    "program_id": program_id,
                    "student_name": student_name,
                    "student_document": "CC-1234",
                    "student_phone": "+57 300 000 0000",
                    "payment_frequency": frequency,
                    "matricula": {
                        "amount": matricula_amount,
                        "payment_date": payment_date,
                        "method": "cash",
                        "reference": null
                    }
                }),
            )
            .await;
        assert_eq!(response.status(), 201, "Failed to create enrollment");
        response.json().await.expect("Invalid enrollment JSON")
    }

    /// Register a module payment and return the RegisterPaymentResponse JSON.
    pub async fn register_module_payment(
        &self,
        enrollment_id: &str,
        amount: &str,
        payment_date: &str,
        module_number: i32,
    ) -> Value {
        let response = self
            .post(
                "/payments",
                &json!({
                    "enrollment_id": enrollment_id,
                    "amount": amount,
                    "payment_date": payment_date,
                    "method": "bank_transfer",
                    "payment_type": "module",
                    "module_number": module_number
                }),
            )
            .await;
        assert_eq!(response.status(), 201, "Failed to register payment");
        response.json().await.expect("Invalid payment JSON")
    }
}

/// Shorthand for pulling a string field out of a JSON value.
pub fn str_field<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("Missing string field {}", pointer))
}

/// Parse a money field. Amounts serialize as strings and come back
/// from NUMERIC columns with a fixed scale, so compare as decimals.
pub fn dec_field(value: &Value, pointer: &str) -> rust_decimal::Decimal {
    str_field(value, pointer)
        .parse()
        .unwrap_or_else(|_| panic!("Field {} is not a decimal", pointer))
}
