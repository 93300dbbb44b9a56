//! Aging report buckets and collection alerts.

mod common;

use common::{dec_field, str_field, TestApp};
use rust_decimal::Decimal;
use serde_json::json;

/// Enroll a student and move their first commitment to `due_date`.
async fn commitment_due_on(app: &TestApp, student: &str, due_date: &str) -> String {
    let program = app
        .create_program(&format!("Programa {}", student), "3500000", 6)
        .await;
    let program_id = str_field(&program, "/program_id");

    let created = app
        .create_enrollment(program_id, student, "60000", "2026-01-15", "monthly")
        .await;
    let commitment_id = str_field(&created, "/first_commitment/commitment_id").to_string();

    let response = app
        .post(
            &format!("/commitments/{}/reschedule", commitment_id),
            &json!({ "new_date": due_date }),
        )
        .await;
    assert_eq!(response.status(), 200);

    commitment_id
}

#[tokio::test]
async fn report_buckets_commitments_around_the_reporting_date() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    // Reporting date fixed via the as_of query parameter.
    commitment_due_on(&app, "Overdue Diez", "2026-05-20").await;
    commitment_due_on(&app, "Due Hoy", "2026-06-01").await;
    commitment_due_on(&app, "Upcoming Cinco", "2026-06-06").await;
    // In the totals but outside the 7-day alert window.
    commitment_due_on(&app, "Lejano Veinte", "2026-06-21").await;

    let response = app.get("/alerts/aging?as_of=2026-06-01").await;
    assert_eq!(response.status(), 200);
    let report: serde_json::Value = response.json().await.expect("Invalid JSON");

    assert_eq!(report["overdue"]["count"], 1);
    assert_eq!(report["due_today"]["count"], 1);
    assert_eq!(report["upcoming"]["count"], 1);

    assert_eq!(
        dec_field(&report, "/overdue/total"),
        Decimal::from(573_333)
    );

    // total_pending covers all four open commitments, windowed or not.
    assert_eq!(
        dec_field(&report, "/total_pending"),
        Decimal::from(573_333) * Decimal::from(4)
    );

    // Alerts only cover the window, ordered by effective date.
    let alerts = report["alerts"].as_array().expect("Expected alerts array");
    assert_eq!(alerts.len(), 3);
    assert_eq!(str_field(&alerts[0], "/student_name"), "Overdue Diez");
    assert_eq!(alerts[0]["days_overdue"], 12);
    assert_eq!(str_field(&alerts[1], "/student_name"), "Due Hoy");
    assert_eq!(str_field(&alerts[2], "/student_name"), "Upcoming Cinco");
}

#[tokio::test]
async fn paid_commitments_leave_the_report() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let program = app.create_program("Diplomado", "3500000", 6).await;
    let program_id = str_field(&program, "/program_id");

    let created = app
        .create_enrollment(program_id, "Laura Gomez", "60000", "2026-01-15", "monthly")
        .await;
    let enrollment_id = str_field(&created, "/enrollment/enrollment_id").to_string();

    // Settling module 1 drops it from the report and schedules module 2.
    app.register_module_payment(&enrollment_id, "573333", "2026-02-14", 1)
        .await;

    let response = app.get("/alerts/aging?as_of=2026-02-15").await;
    let report: serde_json::Value = response.json().await.expect("Invalid JSON");

    // Only module 2 (due 2026-03-15) remains open: outside the window,
    // so it shows up in the totals but not in any bucket.
    assert_eq!(report["overdue"]["count"], 0);
    assert_eq!(report["due_today"]["count"], 0);
    assert_eq!(report["upcoming"]["count"], 0);
    assert_eq!(
        dec_field(&report, "/total_pending"),
        Decimal::from(573_333)
    );
}

#[tokio::test]
async fn empty_tenant_produces_an_empty_report() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app.get("/alerts/aging").await;
    assert_eq!(response.status(), 200);
    let report: serde_json::Value = response.json().await.expect("Invalid JSON");

    assert_eq!(report["overdue"]["count"], 0);
    assert_eq!(dec_field(&report, "/total_pending"), Decimal::ZERO);
    assert_eq!(report["alerts"].as_array().map(|a| a.len()), Some(0));
}
