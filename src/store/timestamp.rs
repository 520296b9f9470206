//! ISO-8601 timestamp encoding for TEXT columns.
//!
//! All timestamps are written as UTC with millisecond precision and a `Z`
//! suffix (`2026-01-31T12:00:00.123Z`). The fixed width keeps lexical order
//! equal to temporal order, which the claim query relies on.

use chrono::{DateTime, SecondsFormat, Utc};

/// 9999-12-31T23:59:59.999Z
const LATEST_MILLIS: i64 = 253_402_300_799_999;

/// Latest instant with a four-digit year. Later instants would format with a
/// sign and extra digits and sort before every ordinary timestamp.
pub fn latest() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(LATEST_MILLIS).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Format `ts`, clamped to [`latest`].
pub fn format(ts: DateTime<Utc>) -> String {
    ts.min(latest()).to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
