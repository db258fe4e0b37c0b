//! Timestamp parsing and formatting for observation times.
//!
//! Source series carry naive local times such as `2024-05-01T13:00`. Values
//! with an offset are normalised to UTC and the offset dropped.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

/// Errors that can occur during timestamp parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    /// The timestamp string is empty.
    #[error("Empty timestamp string")]
    EmptyString,

    /// The timestamp value is invalid.
    #[error("Invalid timestamp: {0}")]
    InvalidFormat(String),
}

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Parses an observation timestamp.
///
/// Accepts RFC 3339, the naive ISO forms above and a bare date (midnight).
pub fn parse_timestamp(input: &str) -> Result<NaiveDateTime, TimestampError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimestampError::EmptyString);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc).naive_utc());
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(naive);
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| TimestampError::InvalidFormat(trimmed.to_string()))
}

/// Parses a timestamp, mapping any failure to `None`.
#[must_use]
pub fn parse_timestamp_lenient(input: &str) -> Option<NaiveDateTime> {
    parse_timestamp(input).ok()
}

/// Formats an observation timestamp the way records carry it.
#[must_use]
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Compact UTC stamp used in archive file names, e.g. `20240501T130000Z`.
#[must_use]
pub fn archive_stamp(at: &DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_parse_minute_precision() {
        let ts = parse_timestamp("2024-05-01T13:00").unwrap();
        assert_eq!(ts.hour(), 13);
    }

    #[test]
    fn test_parse_rfc3339_normalises_to_utc() {
        let ts = parse_timestamp("2024-05-01T13:00:00+02:00").unwrap();
        assert_eq!(ts.hour(), 11);
    }

    #[test]
    fn test_parse_date_only() {
        let ts = parse_timestamp("2024-05-01").unwrap();
        assert_eq!(ts.hour(), 0);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_timestamp("  "), Err(TimestampError::EmptyString));
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(TimestampError::InvalidFormat(_))
        ));
        assert!(parse_timestamp_lenient("nope").is_none());
    }

    #[test]
    fn test_format_roundtrip() {
        let ts = parse_timestamp("2024-05-01T13:05").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-05-01T13:05:00");
        assert_eq!(parse_timestamp(&format_timestamp(&ts)).unwrap(), ts);
    }

    #[test]
    fn test_archive_stamp() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 9).unwrap();
        assert_eq!(archive_stamp(&at), "20240501T130009Z");
    }
}
