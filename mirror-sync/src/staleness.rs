//! Freshness of a profile's mirror, derived from its sync record.
//!
//! Signal precedence:
//! 1. `NeverSynced` (no record)
//! 2. `Failing` (last recorded run failed)
//! 3. `Overdue` (last success older than one schedule period plus grace)
//! 4. `Current`

use chrono::{DateTime, Duration, Utc};

use mirror_core::DailySchedule;

use crate::state::{RecordOutcome, SyncRecord};

/// Tolerance for a scheduled run that is slow to finish.
pub const GRACE: Duration = Duration::hours(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    NeverSynced,
    Current,
    Overdue { last_success: DateTime<Utc> },
    Failing { reason: String },
}

impl Freshness {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NeverSynced => "never synced",
            Self::Current => "current",
            Self::Overdue { .. } => "overdue",
            Self::Failing { .. } => "failing",
        }
    }
}

/// Classify `record` as of `now`.
///
/// `schedule` is daily, so one period is a day; a success older than a day
/// plus [`GRACE`] means at least one scheduled run was missed.
pub fn check(
    record: Option<&SyncRecord>,
    schedule: &DailySchedule,
    now: DateTime<Utc>,
) -> Freshness {
    let Some(record) = record else {
        return Freshness::NeverSynced;
    };

    if record.outcome == RecordOutcome::Failed {
        return Freshness::Failing {
            reason: record
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        };
    }

    let Some(last_success) = record.last_success_at() else {
        return Freshness::NeverSynced;
    };
    let period = schedule.next_after(now) - schedule.previous_at_or_before(now);
    if now.signed_duration_since(last_success) > period + GRACE {
        Freshness::Overdue { last_success }
    } else {
        Freshness::Current
    }
}

/// Format age from a chrono timestamp (`synced_at`).
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let age = Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds()
        .max(0) as u64;
    format_seconds(age)
}

pub fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn record(outcome: RecordOutcome, synced_at: &str) -> SyncRecord {
        SyncRecord {
            synced_at: at(synced_at),
            outcome,
            commit: None,
            source_revision: None,
            files: 1,
            manifest_digest: None,
            error: (outcome == RecordOutcome::Failed).then(|| "push rejected".to_string()),
            last_success: None,
        }
    }

    fn six_am() -> DailySchedule {
        "06:00".parse().unwrap()
    }

    #[test]
    fn no_record_is_never_synced() {
        assert_eq!(
            check(None, &six_am(), at("2024-03-01T12:00:00Z")),
            Freshness::NeverSynced
        );
    }

    #[test]
    fn todays_run_is_current() {
        let r = record(RecordOutcome::NoChanges, "2024-03-01T06:02:00Z");
        assert_eq!(
            check(Some(&r), &six_am(), at("2024-03-01T23:00:00Z")),
            Freshness::Current
        );
    }

    #[test]
    fn yesterdays_run_within_grace_is_current() {
        let r = record(RecordOutcome::Updated, "2024-02-29T06:02:00Z");
        assert_eq!(
            check(Some(&r), &six_am(), at("2024-03-01T06:30:00Z")),
            Freshness::Current
        );
    }

    #[test]
    fn missed_run_past_grace_is_overdue() {
        let r = record(RecordOutcome::Updated, "2024-02-29T06:02:00Z");
        assert_eq!(
            check(Some(&r), &six_am(), at("2024-03-01T08:00:00Z")),
            Freshness::Overdue {
                last_success: at("2024-02-29T06:02:00Z")
            }
        );
    }

    #[test]
    fn failure_wins_over_age() {
        let r = record(RecordOutcome::Failed, "2024-03-01T06:02:00Z");
        assert!(matches!(
            check(Some(&r), &six_am(), at("2024-03-01T07:00:00Z")),
            Freshness::Failing { reason } if reason == "push rejected"
        ));
    }

    #[test]
    fn format_seconds_picks_largest_unit() {
        assert_eq!(format_seconds(5), "5s");
        assert_eq!(format_seconds(120), "2m");
        assert_eq!(format_seconds(7200), "2h");
        assert_eq!(format_seconds(3 * 86_400), "3d");
    }
}
