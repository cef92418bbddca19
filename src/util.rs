use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// Date format used by the RuneMetrics activity feed, e.g. `01-Jan-2024 10:00`.
pub const ACTIVITY_DATE_FORMAT: &str = "%d-%b-%Y %H:%M";

/// Parse an activity feed date (always UTC) into Unix seconds.
pub fn parse_activity_date(date: &str) -> Result<i64, chrono::ParseError> {
    let naive = NaiveDateTime::parse_from_str(date.trim(), ACTIVITY_DATE_FORMAT)?;
    Ok(naive.and_utc().timestamp())
}

/// Format Unix seconds back into the activity feed date format.
///
/// Out-of-range timestamps fall back to the epoch rather than failing a report.
pub fn format_activity_date(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .format(ACTIVITY_DATE_FORMAT)
        .to_string()
}

/// Unix seconds for `now - delta`.
pub fn offset_from(now: i64, delta: Duration) -> i64 {
    now - delta.num_seconds()
}

pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Clan roster names use non-breaking spaces in place of regular ones.
pub fn normalize_display_name(raw: &str) -> String {
    raw.replace('\u{a0}', " ").trim().to_string()
}
