//! Commitment model: a scheduled installment with a small state machine.
//!
//! Transitions: pending -> paid, pending -> rescheduled,
//! rescheduled -> paid. Paid is terminal. Rescheduling an already
//! rescheduled commitment updates the same row in place.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Commitment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentStatus {
    Pending,
    Rescheduled,
    Paid,
}

impl CommitmentStatus {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentStatus::Pending => "pending",
            CommitmentStatus::Rescheduled => "rescheduled",
            CommitmentStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "rescheduled" => CommitmentStatus::Rescheduled,
            "paid" => CommitmentStatus::Paid,
            _ => CommitmentStatus::Pending,
        }
    }

    /// Whether a transition to `next` is allowed.
    pub fn can_transition_to(&self, next: CommitmentStatus) -> bool {
        match (self, next) {
            (CommitmentStatus::Pending, CommitmentStatus::Paid) => true,
            (CommitmentStatus::Pending, CommitmentStatus::Rescheduled) => true,
            (CommitmentStatus::Rescheduled, CommitmentStatus::Paid) => true,
            // Re-rescheduling keeps the status, just moves the date.
            (CommitmentStatus::Rescheduled, CommitmentStatus::Rescheduled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for CommitmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scheduled installment for an enrollment.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Commitment {
    pub commitment_id: Uuid,
    pub tenant_id: Uuid,
    pub enrollment_id: Uuid,
    pub module_number: i32,
    pub amount: Decimal,
    pub scheduled_date: NaiveDate,
    pub rescheduled_date: Option<NaiveDate>,
    pub status: String,
    pub comments: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Commitment {
    /// Get parsed status.
    pub fn parsed_status(&self) -> CommitmentStatus {
        CommitmentStatus::from_string(&self.status)
    }

    /// The date the installment is actually expected on: the
    /// rescheduled date when one exists, otherwise the original.
    pub fn effective_date(&self) -> NaiveDate {
        self.rescheduled_date.unwrap_or(self.scheduled_date)
    }

    pub fn is_paid(&self) -> bool {
        self.parsed_status() == CommitmentStatus::Paid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commitment(status: &str, rescheduled: Option<NaiveDate>) -> Commitment {
        Commitment {
            commitment_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            enrollment_id: Uuid::new_v4(),
            module_number: 1,
            amount: Decimal::from(573_333),
            scheduled_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            rescheduled_date: rescheduled,
            status: status.to_string(),
            comments: None,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn paid_is_terminal() {
        let paid = CommitmentStatus::Paid;
        assert!(!paid.can_transition_to(CommitmentStatus::Pending));
        assert!(!paid.can_transition_to(CommitmentStatus::Rescheduled));
        assert!(!paid.can_transition_to(CommitmentStatus::Paid));
    }

    #[test]
    fn pending_can_be_paid_or_rescheduled() {
        let pending = CommitmentStatus::Pending;
        assert!(pending.can_transition_to(CommitmentStatus::Paid));
        assert!(pending.can_transition_to(CommitmentStatus::Rescheduled));
        // No transition skips back to pending.
        assert!(!CommitmentStatus::Rescheduled.can_transition_to(CommitmentStatus::Pending));
    }

    #[test]
    fn rescheduled_can_be_paid_or_moved_again() {
        let rescheduled = CommitmentStatus::Rescheduled;
        assert!(rescheduled.can_transition_to(CommitmentStatus::Paid));
        assert!(rescheduled.can_transition_to(CommitmentStatus::Rescheduled));
    }

    #[test]
    fn effective_date_prefers_rescheduled() {
        let moved = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        let c = commitment("rescheduled", Some(moved));
        assert_eq!(c.effective_date(), moved);

        let untouched = commitment("pending", None);
        assert_eq!(untouched.effective_date(), untouched.scheduled_date);
    }
}
