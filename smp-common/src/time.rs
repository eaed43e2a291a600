//! Timestamp utilities
//!
//! Play history stores timestamps as RFC 3339 text. Older rows written by
//! SQLite's `CURRENT_TIMESTAMP` or by hand use `YYYY-MM-DD HH:MM:SS` and are
//! read as UTC.

use crate::{Error, Result};
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};

const SQLITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn to_db_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored timestamp (RFC 3339, or SQLite's space-separated form as UTC)
pub fn parse_db_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    // Fractional seconds are accepted and ignored beyond the format's precision
    let without_fraction = value.split('.').next().unwrap_or(value);
    NaiveDateTime::parse_from_str(without_fraction, SQLITE_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::InvalidInput(format!("Invalid timestamp '{}': {}", value, e)))
}

/// Convert a window length in seconds to a chrono duration, saturating at the maximum
pub fn window_from_secs(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Earliest timestamp still inside `window` ending at `now`
///
/// Saturates to the earliest representable time for huge windows.
pub fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
    }

    #[test]
    fn test_db_timestamp_roundtrip_preserves_seconds() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 21, 15, 42).unwrap();
        let stored = to_db_timestamp(ts);
        assert_eq!(stored, "2024-03-09T21:15:42Z");
        assert_eq!(parse_db_timestamp(&stored).unwrap(), ts);
    }

    #[test]
    fn test_parse_sqlite_current_timestamp_format() {
        let parsed = parse_db_timestamp("2024-03-09 21:15:42").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 9, 21, 15, 42).unwrap());
    }

    #[test]
    fn test_parse_offset_timestamp_normalizes_to_utc() {
        let parsed = parse_db_timestamp("2024-03-09T23:15:42+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 9, 21, 15, 42).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_db_timestamp("yesterday"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_window_from_secs() {
        assert_eq!(window_from_secs(7200), Duration::hours(2));
        assert_eq!(window_from_secs(0), Duration::zero());
        assert_eq!(window_from_secs(u64::MAX), Duration::MAX);
    }

    #[test]
    fn test_window_start_saturates() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(
            window_start(now, Duration::hours(2)),
            Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap()
        );
        assert_eq!(window_start(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
    }
}
