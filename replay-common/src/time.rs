//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Whole seconds elapsed between `since` and `until`, clamped at zero
pub fn seconds_between(since: DateTime<Utc>, until: DateTime<Utc>) -> u64 {
    until.signed_duration_since(since).num_seconds().max(0) as u64
}

/// Whole seconds elapsed since `since`
pub fn seconds_since(since: DateTime<Utc>) -> u64 {
    seconds_between(since, now())
}
