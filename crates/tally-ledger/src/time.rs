//! Boundary timestamp normalization.
//!
//! Submissions arrive with timestamps as RFC 3339 strings, bare dates or epoch
//! milliseconds. They are converted to `DateTime<Utc>` here, once; nothing
//! past this module branches on the original representation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    Unparseable { input: String },
    OutOfRange { millis: i64 },
}

impl std::fmt::Display for TimestampError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unparseable { input } => write!(f, "unparseable timestamp: {input:?}"),
            Self::OutOfRange { millis } => write!(f, "timestamp out of range: {millis} ms"),
        }
    }
}

impl std::error::Error for TimestampError {}

/// A timestamp as received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampInput {
    /// Milliseconds since the Unix epoch.
    Millis(i64),
    /// RFC 3339 (`2025-11-03T09:30:00Z`) or a bare date (`2025-11-03`, UTC midnight).
    Text(String),
}

impl TimestampInput {
    pub fn normalize(&self) -> Result<DateTime<Utc>, TimestampError> {
        match self {
            TimestampInput::Millis(ms) => {
                DateTime::from_timestamp_millis(*ms).ok_or(TimestampError::OutOfRange { millis: *ms })
            }
            TimestampInput::Text(s) => parse_timestamp(s),
        }
    }
}

/// Parse an RFC 3339 timestamp or a `YYYY-MM-DD` date.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, TimestampError> {
    let s = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = d.and_hms_opt(0, 0, 0) {
            return Ok(ndt.and_utc());
        }
    }
    Err(TimestampError::Unparseable {
        input: input.to_string(),
    })
}

/// Normalize an optional client timestamp, defaulting to `now`.
pub fn normalize_or(
    input: Option<&TimestampInput>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, TimestampError> {
    match input {
        Some(t) => t.normalize(),
        None => Ok(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn millis_and_rfc3339_agree() {
        let a = TimestampInput::Millis(1_700_000_000_000).normalize().unwrap();
        let b = TimestampInput::Text("2023-11-14T22:13:20Z".to_string())
            .normalize()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn offsets_are_converted_to_utc() {
        let t = parse_timestamp("2025-03-01T12:00:00+02:00").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn bare_date_is_utc_midnight() {
        let t = parse_timestamp("2025-03-01").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(TimestampError::Unparseable { .. })
        ));
    }

    #[test]
    fn json_accepts_number_or_string() {
        let n: TimestampInput = serde_json::from_str("1700000000000").unwrap();
        assert_eq!(n, TimestampInput::Millis(1_700_000_000_000));
        let s: TimestampInput = serde_json::from_str("\"2025-03-01\"").unwrap();
        assert_eq!(s, TimestampInput::Text("2025-03-01".to_string()));
    }

    #[test]
    fn missing_defaults_to_now() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(normalize_or(None, now).unwrap(), now);
    }
}
