//! Aging/alerts computation: a pure, deterministic read-side view over
//! open commitments. No mutation, safe to recompute concurrently with
//! writers.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Alert window: commitments due more than this many days out are not
/// alerted on.
pub const ALERT_WINDOW_DAYS: i64 = 7;

/// Where an open commitment sits relative to "today".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgingBucket {
    Overdue,
    DueToday,
    Upcoming,
}

/// Open (non-paid) commitment joined with enrollment identity, as read
/// from the database for alerting.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OpenCommitment {
    pub commitment_id: Uuid,
    pub enrollment_id: Uuid,
    pub student_name: String,
    pub student_phone: Option<String>,
    pub module_number: i32,
    pub amount: Decimal,
    pub scheduled_date: NaiveDate,
    pub rescheduled_date: Option<NaiveDate>,
    pub status: String,
}

impl OpenCommitment {
    pub fn effective_date(&self) -> NaiveDate {
        self.rescheduled_date.unwrap_or(self.scheduled_date)
    }
}

/// Single alert line in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgingAlert {
    pub commitment_id: Uuid,
    pub enrollment_id: Uuid,
    pub student_name: String,
    pub student_phone: Option<String>,
    pub module_number: i32,
    pub amount: Decimal,
    pub effective_date: NaiveDate,
    pub bucket: AgingBucket,
    /// Days past due; zero unless the bucket is `overdue`.
    pub days_overdue: i64,
}

/// Per-bucket aggregation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketSummary {
    pub count: i64,
    pub total: Decimal,
}

/// Full aging report for a tenant at an as-of date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgingReport {
    pub as_of: NaiveDate,
    pub overdue: BucketSummary,
    pub due_today: BucketSummary,
    pub upcoming: BucketSummary,
    /// Sum over all open commitments, including those beyond the alert
    /// window.
    pub total_pending: Decimal,
    pub alerts: Vec<AgingAlert>,
}

/// Classify one effective date against `today`. `None` means the
/// commitment is outside the alert window (not an error, just quiet).
pub fn classify(effective_date: NaiveDate, today: NaiveDate) -> Option<AgingBucket> {
    if effective_date < today {
        Some(AgingBucket::Overdue)
    } else if effective_date == today {
        Some(AgingBucket::DueToday)
    } else if effective_date <= today + chrono::Duration::days(ALERT_WINDOW_DAYS) {
        Some(AgingBucket::Upcoming)
    } else {
        None
    }
}

/// Build the aging report from the open commitments of a tenant.
/// Deterministic given the same `today` and input set.
pub fn build_report(commitments: &[OpenCommitment], today: NaiveDate) -> AgingReport {
    let mut report = AgingReport {
        as_of: today,
        overdue: BucketSummary::default(),
        due_today: BucketSummary::default(),
        upcoming: BucketSummary::default(),
        total_pending: Decimal::ZERO,
        alerts: Vec::new(),
    };

    for commitment in commitments {
        report.total_pending += commitment.amount;

        let effective = commitment.effective_date();
        let Some(bucket) = classify(effective, today) else {
            continue;
        };

        let days_overdue = match bucket {
            AgingBucket::Overdue => (today - effective).num_days(),
            _ => 0,
        };

        let summary = match bucket {
            AgingBucket::Overdue => &mut report.overdue,
            AgingBucket::DueToday => &mut report.due_today,
            AgingBucket::Upcoming => &mut report.upcoming,
        };
        summary.count += 1;
        summary.total += commitment.amount;

        report.alerts.push(AgingAlert {
            commitment_id: commitment.commitment_id,
            enrollment_id: commitment.enrollment_id,
            student_name: commitment.student_name.clone(),
            student_phone: commitment.student_phone.clone(),
            module_number: commitment.module_number,
            amount: commitment.amount,
            effective_date: effective,
            bucket,
            days_overdue,
        });
    }

    // Most pressing first: overdue by age, then today, then upcoming.
    report.alerts.sort_by_key(|a| a.effective_date);

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn open(effective_offset_days: i64, amount: i64, today: NaiveDate) -> OpenCommitment {
        OpenCommitment {
            commitment_id: Uuid::new_v4(),
            enrollment_id: Uuid::new_v4(),
            student_name: "Student".to_string(),
            student_phone: None,
            module_number: 1,
            amount: Decimal::from(amount),
            scheduled_date: today + Duration::days(effective_offset_days),
            rescheduled_date: None,
            status: "pending".to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 15).unwrap()
    }

    #[test]
    fn classify_window_edges() {
        let t = today();
        assert_eq!(classify(t - Duration::days(1), t), Some(AgingBucket::Overdue));
        assert_eq!(classify(t, t), Some(AgingBucket::DueToday));
        assert_eq!(classify(t + Duration::days(1), t), Some(AgingBucket::Upcoming));
        assert_eq!(classify(t + Duration::days(7), t), Some(AgingBucket::Upcoming));
        assert_eq!(classify(t + Duration::days(8), t), None);
    }

    #[test]
    fn every_commitment_lands_in_exactly_one_bucket() {
        let t = today();
        // Sweep a range of effective dates around the window.
        let commitments: Vec<OpenCommitment> =
            (-30..30).map(|offset| open(offset, 1000, t)).collect();

        let report = build_report(&commitments, t);

        let in_window = commitments
            .iter()
            .filter(|c| c.effective_date() <= t + Duration::days(ALERT_WINDOW_DAYS))
            .count() as i64;

        let bucketed = report.overdue.count + report.due_today.count + report.upcoming.count;
        assert_eq!(bucketed, in_window);
        assert_eq!(report.alerts.len() as i64, bucketed);
    }

    #[test]
    fn totals_aggregate_per_bucket_and_overall() {
        let t = today();
        let commitments = vec![
            open(-10, 100_000, t), // overdue
            open(-1, 200_000, t),  // overdue
            open(0, 50_000, t),    // due today
            open(3, 75_000, t),    // upcoming
            open(30, 999_000, t),  // outside window, still pending
        ];

        let report = build_report(&commitments, t);

        assert_eq!(report.overdue.count, 2);
        assert_eq!(report.overdue.total, Decimal::from(300_000));
        assert_eq!(report.due_today.count, 1);
        assert_eq!(report.due_today.total, Decimal::from(50_000));
        assert_eq!(report.upcoming.count, 1);
        assert_eq!(report.upcoming.total, Decimal::from(75_000));
        // total_pending counts the excluded one too
        assert_eq!(report.total_pending, Decimal::from(1_424_000));
    }

    #[test]
    fn days_overdue_counts_calendar_days() {
        let t = today();
        let report = build_report(&[open(-12, 1000, t)], t);
        assert_eq!(report.alerts[0].days_overdue, 12);
        assert_eq!(report.alerts[0].bucket, AgingBucket::Overdue);
    }

    #[test]
    fn rescheduled_date_drives_the_bucket() {
        let t = today();
        let mut c = open(-20, 1000, t);
        c.rescheduled_date = Some(t + Duration::days(5));
        c.status = "rescheduled".to_string();

        let report = build_report(&[c], t);
        assert_eq!(report.upcoming.count, 1);
        assert_eq!(report.overdue.count, 0);
    }

    #[test]
    fn empty_input_is_a_valid_empty_report() {
        let report = build_report(&[], today());
        assert_eq!(report.total_pending, Decimal::ZERO);
        assert!(report.alerts.is_empty());
    }
}
