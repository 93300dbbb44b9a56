//! Health and readiness probe tests.

mod common;

use common::TestApp;

#[tokio::test]
async fn health_check_reports_ok() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app.get("/health").await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("Invalid JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "receivables-service");
}

#[tokio::test]
async fn readiness_check_reports_ok() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app.get("/ready").await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn metrics_endpoint_serves_prometheus_text() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app.get("/metrics").await;
    assert_eq!(response.status(), 200);

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn failed_requests_show_up_in_the_error_counter() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app
        .get(&format!("/payments/{}", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(response.status(), 404);

    let body = app
        .get("/metrics")
        .await
        .text()
        .await
        .expect("Invalid metrics body");
    assert!(body.contains("receivables_errors_total"));
    assert!(body.contains("error_type=\"not_found\""));
}

#[tokio::test]
async fn request_id_is_echoed_when_valid_and_replaced_when_not() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app
        .client
        .get(format!("{}/health", app.address))
        .header("x-request-id", "trace-1234")
        .send()
        .await
        .expect("Request failed");
    let echoed = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .expect("Missing request id header")
        .to_string();
    assert_eq!(echoed, "trace-1234");

    let oversized = "x".repeat(80);
    let response = app
        .client
        .get(format!("{}/health", app.address))
        .header("x-request-id", &oversized)
        .send()
        .await
        .expect("Request failed");
    let replaced = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .expect("Missing request id header")
        .to_string();
    assert_ne!(replaced, oversized);
    assert!(uuid::Uuid::parse_str(&replaced).is_ok());
}

#[tokio::test]
async fn missing_tenant_header_is_rejected() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app
        .client
        .get(format!("{}/programs", app.address))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 400);
}
