//! Commitment lifecycle: reschedule semantics and the terminal paid state.

mod common;

use common::{str_field, TestApp};
use serde_json::json;

async fn setup_commitment(app: &TestApp) -> (String, String) {
    let program = app.create_program("Diplomado", "3500000", 6).await;
    let program_id = str_field(&program, "/program_id");

    let created = app
        .create_enrollment(program_id, "Laura Gomez", "60000", "2026-01-15", "monthly")
        .await;

    (
        str_field(&created, "/enrollment/enrollment_id").to_string(),
        str_field(&created, "/first_commitment/commitment_id").to_string(),
    )
}

#[tokio::test]
async fn pending_commitment_can_be_rescheduled() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let (_, commitment_id) = setup_commitment(&app).await;

    let response = app
        .post(
            &format!("/commitments/{}/reschedule", commitment_id),
            &json!({ "new_date": "2026-03-01", "comment": "Pidio plazo por viaje" }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let commitment: serde_json::Value = response.json().await.expect("Invalid JSON");

    assert_eq!(commitment["status"], "rescheduled");
    assert_eq!(str_field(&commitment, "/rescheduled_date"), "2026-03-01");
    // The original date is kept for the audit trail.
    assert_eq!(str_field(&commitment, "/scheduled_date"), "2026-02-15");
    assert!(str_field(&commitment, "/comments").contains("Pidio plazo"));
}

#[tokio::test]
async fn rescheduling_twice_keeps_the_latest_date() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let (_, commitment_id) = setup_commitment(&app).await;

    app.post(
        &format!("/commitments/{}/reschedule", commitment_id),
        &json!({ "new_date": "2026-03-01" }),
    )
    .await;

    let response = app
        .post(
            &format!("/commitments/{}/reschedule", commitment_id),
            &json!({ "new_date": "2026-03-20", "comment": "Segundo plazo" }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let commitment: serde_json::Value = response.json().await.expect("Invalid JSON");

    assert_eq!(commitment["status"], "rescheduled");
    assert_eq!(str_field(&commitment, "/rescheduled_date"), "2026-03-20");
}

#[tokio::test]
async fn paid_commitment_refuses_reschedule_and_stays_unchanged() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let (enrollment_id, commitment_id) = setup_commitment(&app).await;

    // Settle commitment 1 with a module payment.
    app.register_module_payment(&enrollment_id, "573333", "2026-02-14", 1)
        .await;

    let response = app
        .post(
            &format!("/commitments/{}/reschedule", commitment_id),
            &json!({ "new_date": "2026-04-01" }),
        )
        .await;
    assert_eq!(response.status(), 409);

    // Row is untouched by the refused transition.
    let response = app.get(&format!("/commitments/{}", commitment_id)).await;
    assert_eq!(response.status(), 200);
    let commitment: serde_json::Value = response.json().await.expect("Invalid JSON");
    assert_eq!(commitment["status"], "paid");
    assert!(commitment["rescheduled_date"].is_null());
}

#[tokio::test]
async fn reschedule_of_unknown_commitment_is_not_found() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app
        .post(
            "/commitments/99999999-9999-9999-9999-999999999999/reschedule",
            &json!({ "new_date": "2026-04-01" }),
        )
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn rescheduled_commitment_settles_like_a_pending_one() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let (enrollment_id, commitment_id) = setup_commitment(&app).await;

    app.post(
        &format!("/commitments/{}/reschedule", commitment_id),
        &json!({ "new_date": "2026-03-01" }),
    )
    .await;

    app.register_module_payment(&enrollment_id, "573333", "2026-03-01", 1)
        .await;

    let response = app.get(&format!("/commitments/{}", commitment_id)).await;
    let commitment: serde_json::Value = response.json().await.expect("Invalid JSON");
    assert_eq!(commitment["status"], "paid");

    // Next commitment is scheduled from the rescheduled (effective) date.
    let response = app
        .get(&format!("/enrollments/{}/commitments", enrollment_id))
        .await;
    let commitments: serde_json::Value = response.json().await.expect("Invalid JSON");
    let list = commitments.as_array().expect("Expected array");
    assert_eq!(list.len(), 2);
    assert_eq!(str_field(&list[1], "/scheduled_date"), "2026-04-01");
}
