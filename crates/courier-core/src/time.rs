//! Timestamp helpers.
//!
//! Every persisted timestamp is a signed count of milliseconds since the Unix
//! epoch, matching what the records carried before they were typed.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{CoreError, Result};

/// Milliseconds in one second.
pub const MILLIS_PER_SECOND: i64 = 1_000;

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// `base` advanced by `seconds`, saturating at `i64::MAX`.
#[must_use]
pub fn add_seconds(base: i64, seconds: u64) -> i64 {
    let delta = i64::try_from(seconds)
        .unwrap_or(i64::MAX)
        .saturating_mul(MILLIS_PER_SECOND);
    base.saturating_add(delta)
}

/// Convert epoch milliseconds into a `DateTime`.
///
/// # Errors
///
/// Returns `CoreError::TimestampOutOfRange` if chrono cannot represent it.
pub fn to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or(CoreError::TimestampOutOfRange(millis))
}

/// Format epoch milliseconds as `HH:MM` (UTC), the label used in exports.
///
/// # Errors
///
/// Returns `CoreError::TimestampOutOfRange` if chrono cannot represent it.
pub fn clock_label(millis: i64) -> Result<String> {
    Ok(to_datetime(millis)?.format("%H:%M").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_seconds_scales_to_millis() {
        assert_eq!(add_seconds(1_000, 5), 6_000);
    }

    #[test]
    fn add_seconds_saturates() {
        assert_eq!(add_seconds(i64::MAX - 1, 10), i64::MAX);
        assert_eq!(add_seconds(0, u64::MAX), i64::MAX);
    }

    #[test]
    fn clock_label_formats_utc() {
        // 1970-01-01T01:02:03Z
        let millis = (3_600 + 2 * 60 + 3) * MILLIS_PER_SECOND;
        assert_eq!(clock_label(millis).unwrap(), "01:02");
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }
}
