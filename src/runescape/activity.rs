//! Classification of RuneMetrics `profile/profile` responses.
//!
//! Status 429 is a rate limit regardless of body. A JSON body carrying an
//! `error` field is either a private profile (`PROFILE_PRIVATE`) or a
//! transient failure; otherwise the `activities` list (possibly absent) is
//! parsed into timestamped records.

use serde::Deserialize;

use super::{Activity, ActivityOutcome, PROFILE_PRIVATE};
use crate::util::parse_activity_date;

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    activities: Option<Vec<RawActivity>>,
}

#[derive(Debug, Deserialize)]
struct RawActivity {
    date: String,
    #[serde(default)]
    details: String,
    text: String,
}

/// Classify one response, keeping at most `limit` of the newest records.
pub fn classify_response(status: u16, body: &str, limit: usize) -> ActivityOutcome {
    if status == 429 {
        return ActivityOutcome::RateLimited;
    }
    if !(200..300).contains(&status) {
        return ActivityOutcome::TransientError(format!("HTTP {}", status));
    }

    let response: ProfileResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return ActivityOutcome::TransientError(format!("Malformed profile JSON: {}", e)),
    };

    if let Some(error) = response.error {
        if error == PROFILE_PRIVATE {
            return ActivityOutcome::Inaccessible;
        }
        return ActivityOutcome::TransientError(format!("RuneMetrics error: {}", error));
    }

    let raw = response.activities.unwrap_or_default();
    let mut activities = Vec::with_capacity(raw.len());
    for record in raw {
        let timestamp = match parse_activity_date(&record.date) {
            Ok(ts) => ts,
            Err(e) => {
                return ActivityOutcome::TransientError(format!(
                    "Unparseable activity date '{}': {}",
                    record.date, e
                ))
            }
        };
        activities.push(Activity {
            timestamp,
            details: record.details,
            text: record.text,
        });
    }

    // Feed is documented newest-first; enforce it so callers can rely on index 0.
    activities.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    activities.truncate(limit);
    ActivityOutcome::Activities(activities)
}

/// Most recent timestamp in a feed, if any.
pub fn latest_timestamp(activities: &[Activity]) -> Option<i64> {
    activities.iter().map(|a| a.timestamp).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_429_is_rate_limited_regardless_of_body() {
        assert_eq!(classify_response(429, "not json", 20), ActivityOutcome::RateLimited);
        assert_eq!(
            classify_response(429, r#"{"error":"PROFILE_PRIVATE"}"#, 20),
            ActivityOutcome::RateLimited
        );
    }

    #[test]
    fn test_private_profile() {
        assert_eq!(
            classify_response(200, r#"{"error":"PROFILE_PRIVATE","loggedIn":"false"}"#, 20),
            ActivityOutcome::Inaccessible
        );
    }

    #[test]
    fn test_other_api_error_is_transient() {
        match classify_response(200, r#"{"error":"NO_PROFILE"}"#, 20) {
            ActivityOutcome::TransientError(msg) => assert!(msg.contains("NO_PROFILE")),
            other => panic!("expected transient error, got {:?}", other),
        }
    }

    #[test]
    fn test_server_error_and_bad_json_are_transient() {
        assert!(matches!(
            classify_response(503, "", 20),
            ActivityOutcome::TransientError(_)
        ));
        assert!(matches!(
            classify_response(200, "<html>", 20),
            ActivityOutcome::TransientError(_)
        ));
    }

    #[test]
    fn test_parses_activities_newest_first() {
        let body = r#"{
            "name": "Alice",
            "activities": [
                {"date": "01-Jan-2024 09:00", "details": "", "text": "I levelled my Mining skill, I am now level 80."},
                {"date": "01-Jan-2024 10:00", "details": "I capped at my Clan Citadel.", "text": "Capped at my Clan Citadel."}
            ]
        }"#;
        match classify_response(200, body, 20) {
            ActivityOutcome::Activities(list) => {
                assert_eq!(list.len(), 2);
                assert_eq!(list[0].timestamp, 1_704_103_200);
                assert_eq!(list[0].text, "Capped at my Clan Citadel.");
                assert_eq!(latest_timestamp(&list), Some(1_704_103_200));
            }
            other => panic!("expected activities, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_activities_is_empty() {
        assert_eq!(
            classify_response(200, r#"{"name":"Bob"}"#, 20),
            ActivityOutcome::Activities(vec![])
        );
    }

    #[test]
    fn test_bad_date_is_transient() {
        let body = r#"{"activities":[{"date":"yesterday","details":"","text":"x"}]}"#;
        assert!(matches!(
            classify_response(200, body, 20),
            ActivityOutcome::TransientError(_)
        ));
    }

    #[test]
    fn test_truncates_to_requested_count() {
        let body = r#"{"activities":[
            {"date":"01-Jan-2024 10:00","details":"","text":"a"},
            {"date":"03-Jan-2024 10:00","details":"","text":"c"},
            {"date":"02-Jan-2024 10:00","details":"","text":"b"}
        ]}"#;
        match classify_response(200, body, 2) {
            ActivityOutcome::Activities(list) => {
                let texts: Vec<&str> = list.iter().map(|a| a.text.as_str()).collect();
                assert_eq!(texts, vec!["c", "b"]);
            }
            other => panic!("expected activities, got {:?}", other),
        }
    }
}
