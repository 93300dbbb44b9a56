//! Payment model: immutable records of money received, each carrying a
//! tenant-unique receipt number in the form `REC-YYYYMM-NNNNN`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How the money arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    MobileWalletA,
    MobileWalletB,
    Cash,
    Other,
}

impl PaymentMethod {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::MobileWalletA => "mobile_wallet_a",
            PaymentMethod::MobileWalletB => "mobile_wallet_b",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            "mobile_wallet_a" => Some(PaymentMethod::MobileWalletA),
            "mobile_wallet_b" => Some(PaymentMethod::MobileWalletB),
            "cash" => Some(PaymentMethod::Cash),
            "other" => Some(PaymentMethod::Other),
            _ => None,
        }
    }

    /// Spanish display label for receipts.
    pub fn label_es(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "Transferencia bancaria",
            PaymentMethod::MobileWalletA => "Billetera movil A",
            PaymentMethod::MobileWalletB => "Billetera movil B",
            PaymentMethod::Cash => "Efectivo",
            PaymentMethod::Other => "Otro",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the payment settles: the matricula fee or a module installment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Matricula,
    Module,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Matricula => "matricula",
            PaymentType::Module => "module",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "matricula" => Some(PaymentType::Matricula),
            "module" => Some(PaymentType::Module),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered payment.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub tenant_id: Uuid,
    pub enrollment_id: Uuid,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub method: String,
    pub payment_type: String,
    pub module_number: Option<i32>,
    pub reference: Option<String>,
    pub comments: Option<String>,
    /// Allocation month (`YYYYMM`) the receipt sequence is scoped to.
    pub receipt_month: String,
    pub receipt_seq: i32,
    pub receipt_number: String,
    pub registered_by: String,
    pub created_utc: DateTime<Utc>,
}

impl Payment {
    /// Get parsed payment method.
    pub fn parsed_method(&self) -> Option<PaymentMethod> {
        PaymentMethod::from_str(&self.method)
    }

    /// Get parsed payment type.
    pub fn parsed_type(&self) -> Option<PaymentType> {
        PaymentType::from_str(&self.payment_type)
    }
}

/// Input for registering a payment against an enrollment.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub tenant_id: Uuid,
    pub enrollment_id: Uuid,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub payment_type: PaymentType,
    pub module_number: Option<i32>,
    pub reference: Option<String>,
    pub comments: Option<String>,
    pub registered_by: String,
}

/// Post-hoc correction of a payment record. Never touches the
/// enrollment balance.
#[derive(Debug, Clone, Default)]
pub struct PaymentCorrection {
    pub amount: Option<Decimal>,
    pub payment_date: Option<NaiveDate>,
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
    pub comments: Option<String>,
}

/// Filter parameters for listing payments (export feed).
#[derive(Debug, Clone, Default)]
pub struct ListPaymentsFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub method: Option<PaymentMethod>,
    pub enrollment_id: Option<Uuid>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

/// Receipt sequence month (`YYYYMM`) for a given date.
pub fn receipt_month(date: NaiveDate) -> String {
    date.format("%Y%m").to_string()
}

/// Externally visible receipt number: `REC-YYYYMM-NNNNN`.
pub fn format_receipt_number(month: &str, seq: i32) -> String {
    format!("REC-{}-{:05}", month, seq)
}
