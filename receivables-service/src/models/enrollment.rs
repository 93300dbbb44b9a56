//! Enrollment model: one student's subscription to one program, carrying
//! the running balance that payments settle against.

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::PaymentMethod;

/// Installment cadence for an enrollment's payment plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentFrequency {
    Monthly,
    Biweekly,
}

impl PaymentFrequency {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentFrequency::Monthly => "monthly",
            PaymentFrequency::Biweekly => "biweekly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(PaymentFrequency::Monthly),
            "biweekly" => Some(PaymentFrequency::Biweekly),
            _ => None,
        }
    }

    /// Next due date one interval after `from`.
    ///
    /// Monthly advances by one calendar month (clamping at month end,
    /// e.g. Jan 31 -> Feb 28); biweekly advances by a fixed 15 days.
    pub fn next_due_date(&self, from: NaiveDate) -> NaiveDate {
        match self {
            PaymentFrequency::Monthly => from
                .checked_add_months(Months::new(1))
                .unwrap_or_else(|| from + Duration::days(30)),
            PaymentFrequency::Biweekly => from + Duration::days(15),
        }
    }
}

impl std::fmt::Display for PaymentFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Student enrollment with its running balance.
///
/// `total_value` is copied from the program at matriculation and never
/// changes afterwards; `total_paid` only ever increases.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Enrollment {
    pub enrollment_id: Uuid,
    pub tenant_id: Uuid,
    pub program_id: Uuid,
    pub student_name: String,
    pub student_document: Option<String>,
    pub student_phone: Option<String>,
    pub total_value: Decimal,
    pub total_paid: Decimal,
    pub payment_frequency: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Enrollment {
    /// Get parsed payment frequency.
    pub fn parsed_frequency(&self) -> Option<PaymentFrequency> {
        PaymentFrequency::from_str(&self.payment_frequency)
    }

    /// Amount still owed, clamped at zero. Overpayment is accepted but
    /// the excess is not tracked as a credit.
    pub fn remaining_balance(&self) -> Decimal {
        (self.total_value - self.total_paid).max(Decimal::ZERO)
    }
}

/// Balance view returned alongside payment registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub enrollment_id: Uuid,
    pub total_value: Decimal,
    pub total_paid: Decimal,
    pub remaining_balance: Decimal,
}

impl From<&Enrollment> for BalanceSnapshot {
    fn from(e: &Enrollment) -> Self {
        Self {
            enrollment_id: e.enrollment_id,
            total_value: e.total_value,
            total_paid: e.total_paid,
            remaining_balance: e.remaining_balance(),
        }
    }
}

/// Initial matricula payment registered together with the enrollment.
#[derive(Debug, Clone)]
pub struct MatriculaInput {
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

/// Input for creating an enrollment at matriculation.
#[derive(Debug, Clone)]
pub struct CreateEnrollment {
    pub tenant_id: Uuid,
    pub program_id: Uuid,
    pub student_name: String,
    pub student_document: Option<String>,
    pub student_phone: Option<String>,
    pub payment_frequency: PaymentFrequency,
    pub matricula: MatriculaInput,
    pub registered_by: String,
}

/// Per-module installment amount for a program plan.
///
/// The matricula is paid up front, so the remainder is split evenly
/// across the modules and truncated to whole pesos.
pub fn installment_amount(
    total_value: Decimal,
    matricula_amount: Decimal,
    modules_count: i32,
) -> Decimal {
    if modules_count <= 0 {
        return Decimal::ZERO;
    }
    ((total_value - matricula_amount) / Decimal::from(modules_count)).trunc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installment_splits_remainder_after_matricula() {
        // 3,500,000 program, 60,000 matricula, 6 modules -> 573,333 each
        let amount = installment_amount(Decimal::from(3_500_000), Decimal::from(60_000), 6);
        assert_eq!(amount, Decimal::from(573_333));
    }

    #[test]
    fn installment_with_zero_modules_is_zero() {
        assert_eq!(
            installment_amount(Decimal::from(1_000_000), Decimal::ZERO, 0),
            Decimal::ZERO
        );
    }

    #[test]
    fn monthly_advances_one_calendar_month() {
        let from = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let next = PaymentFrequency::Monthly.next_due_date(from);
        assert_eq!(next, NaiveDate::from_ymd_opt(2026, 2, 15).unwrap());
    }

    #[test]
    fn monthly_clamps_at_month_end() {
        let from = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        let next = PaymentFrequency::Monthly.next_due_date(from);
        assert_eq!(next, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
    }

    #[test]
    fn biweekly_advances_fifteen_days() {
        let from = NaiveDate::from_ymd_opt(2026, 3, 25).unwrap();
        let next = PaymentFrequency::Biweekly.next_due_date(from);
        assert_eq!(next, NaiveDate::from_ymd_opt(2026, 4, 9).unwrap());
    }

    #[test]
    fn remaining_balance_clamps_at_zero_on_overpayment() {
        let enrollment = Enrollment {
            enrollment_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            program_id: Uuid::new_v4(),
            student_name: "Test".to_string(),
            student_document: None,
            student_phone: None,
            total_value: Decimal::from(100_000),
            total_paid: Decimal::from(150_000),
            payment_frequency: "monthly".to_string(),
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        };
        assert_eq!(enrollment.remaining_balance(), Decimal::ZERO);
        // total_paid itself keeps the true sum
        assert_eq!(enrollment.total_paid, Decimal::from(150_000));
    }
}
