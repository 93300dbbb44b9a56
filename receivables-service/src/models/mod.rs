//! Domain models for receivables-service.

mod aging;
mod commitment;
mod enrollment;
mod payment;
mod program;
mod receipt;

pub use aging::{build_report, classify, AgingAlert, AgingBucket, AgingReport, BucketSummary, OpenCommitment, ALERT_WINDOW_DAYS};
pub use commitment::{Commitment, CommitmentStatus};
pub use enrollment::{
    installment_amount, BalanceSnapshot, CreateEnrollment, Enrollment, MatriculaInput,
    PaymentFrequency,
};
pub use payment::{
    format_receipt_number, receipt_month, CreatePayment, ListPaymentsFilter, Payment,
    PaymentCorrection, PaymentMethod, PaymentType,
};
pub use program::{CreateProgram, Program};
pub use receipt::{format_pesos, format_receipt_message, Receipt};
