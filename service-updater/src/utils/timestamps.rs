//! Timestamp helpers.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Wall-clock instant used throughout progress records.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Returns the current UTC time as an RFC 3339 string with microseconds.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Time elapsed from `start` to `now`.
///
/// Clock skew that puts `start` after `now` yields zero rather than an error.
#[must_use]
pub fn elapsed_between(start: Timestamp, now: Timestamp) -> Duration {
    (now - start).to_std().unwrap_or(Duration::ZERO)
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
#[must_use]
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_between() {
        let start = now_utc();
        let later = start + chrono::Duration::milliseconds(2500);
        assert_eq!(elapsed_between(start, later), Duration::from_millis(2500));
    }

    #[test]
    fn test_elapsed_between_clamps_skew() {
        let now = now_utc();
        let future = now + chrono::Duration::seconds(5);
        assert_eq!(elapsed_between(future, now), Duration::ZERO);
    }

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }
}
