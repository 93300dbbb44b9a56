//! Request and response shapes for the HTTP surface.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    AgingReport, BalanceSnapshot, Commitment, Enrollment, Payment, PaymentFrequency,
    PaymentMethod, PaymentType, Receipt,
};

fn default_page_size() -> i32 {
    50
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProgramRequest {
    #[validate(length(min = 1, max = 200, message = "Program name cannot be empty"))]
    pub name: String,
    pub total_value: Decimal,
    #[validate(range(min = 1, message = "Programs have at least one module"))]
    pub modules_count: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MatriculaRequest {
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEnrollmentRequest {
    pub program_id: Uuid,
    #[validate(length(min = 1, max = 200, message = "Student name cannot be empty"))]
    pub student_name: String,
    pub student_document: Option<String>,
    pub student_phone: Option<String>,
    pub payment_frequency: PaymentFrequency,
    #[validate(nested)]
    pub matricula: MatriculaRequest,
}

#[derive(Debug, Serialize)]
pub struct CreateEnrollmentResponse {
    pub enrollment: Enrollment,
    pub matricula_payment: Payment,
    pub first_commitment: Option<Commitment>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterPaymentRequest {
    pub enrollment_id: Uuid,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub payment_type: PaymentType,
    pub module_number: Option<i32>,
    pub reference: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterPaymentResponse {
    pub payment: Payment,
    pub balance: BalanceSnapshot,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CorrectPaymentRequest {
    pub amount: Option<Decimal>,
    pub payment_date: Option<NaiveDate>,
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RescheduleCommitmentRequest {
    pub new_date: NaiveDate,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MarkReceiptSentRequest {
    #[validate(length(min = 1, message = "Delivery channel cannot be empty"))]
    pub via: String,
}

/// Receipt plus the rendered delivery text.
#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub receipt: Receipt,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListPaymentsQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub method: Option<PaymentMethod>,
    pub enrollment_id: Option<Uuid>,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AgingQuery {
    /// Reporting date; defaults to today (UTC).
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct AgingResponse {
    #[serde(flatten)]
    pub report: AgingReport,
}

#[derive(Debug, Serialize)]
pub struct DeleteEnrollmentResponse {
    pub payments_deleted: u64,
    pub commitments_deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentDetailResponse {
    pub enrollment: Enrollment,
    pub balance: BalanceSnapshot,
}
