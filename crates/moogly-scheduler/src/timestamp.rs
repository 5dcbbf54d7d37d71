//! Parsing of operator-supplied start times, and Discord timestamp tags.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::error::EventError;

static DISCORD_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<t:(-?\d+)(?::[tTdDfFR])?>$").expect("static regex")
});

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Parse a start time. Naive date-times are read as UTC.
///
/// Accepts `2026-03-01 19:00:00`, `2026-03-01 19:00`, RFC 3339,
/// `<t:1772391600>` / `<t:1772391600:F>` and bare unix seconds.
pub fn parse_trigger_time(input: &str) -> Result<DateTime<Utc>, EventError> {
    let s = input.trim();
    let invalid = || EventError::InvalidTimestamp(s.to_string());

    if s.is_empty() {
        return Err(invalid());
    }

    if let Some(caps) = DISCORD_TAG.captures(s) {
        let secs: i64 = caps[1].parse().map_err(|_| invalid())?;
        return DateTime::from_timestamp(secs, 0).ok_or_else(invalid);
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = s.parse().map_err(|_| invalid())?;
        return DateTime::from_timestamp(secs, 0).ok_or_else(invalid);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(invalid)
}

/// Full date/time tag, rendered in each reader's timezone.
pub fn display_tag(at: DateTime<Utc>) -> String {
    format!("<t:{}:F>", at.timestamp())
}

/// "in 2 hours" style tag.
pub fn relative_tag(at: DateTime<Utc>) -> String {
    format!("<t:{}:R>", at.timestamp())
}
