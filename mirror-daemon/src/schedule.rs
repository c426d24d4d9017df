//! Which profiles are due, and when to wake up next.

use chrono::{DateTime, Utc};

use mirror_core::SyncProfile;

/// Profiles whose scheduled time falls in `(since, until]`, in config order.
pub fn due_profiles(
    profiles: &[SyncProfile],
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Vec<String> {
    profiles
        .iter()
        .filter(|p| p.schedule.next_after(since) <= until)
        .map(|p| p.name.0.clone())
        .collect()
}

/// Earliest scheduled run strictly after `now`.
pub fn next_wakeup(profiles: &[SyncProfile], now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    profiles.iter().map(|p| p.schedule.next_after(now)).min()
}
