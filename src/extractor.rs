//! Target-event detection over an activity feed.
//!
//! Matching is exact and case-sensitive. If upstream rewords the
//! notification, nothing matches.

use crate::runescape::Activity;

/// Signature text RuneMetrics emits when a member caps at the clan citadel.
pub const CITADEL_CAP_TEXT: &str = "Capped at my Clan Citadel.";

/// Activities whose text equals `signature`, in feed order.
pub fn extract_events<'a>(activities: &'a [Activity], signature: &str) -> Vec<&'a Activity> {
    activities.iter().filter(|a| a.text == signature).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(timestamp: i64, text: &str) -> Activity {
        Activity {
            timestamp,
            details: String::new(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_extracts_matches_in_order() {
        let feed = vec![
            activity(3, CITADEL_CAP_TEXT),
            activity(2, "Levelled up Fishing."),
            activity(1, CITADEL_CAP_TEXT),
        ];
        let found = extract_events(&feed, CITADEL_CAP_TEXT);
        let stamps: Vec<i64> = found.iter().map(|a| a.timestamp).collect();
        assert_eq!(stamps, vec![3, 1]);
    }

    #[test]
    fn test_match_is_exact_and_case_sensitive() {
        let feed = vec![
            activity(1, "capped at my clan citadel."),
            activity(2, "Capped at my Clan Citadel"),
            activity(3, " Capped at my Clan Citadel."),
        ];
        assert!(extract_events(&feed, CITADEL_CAP_TEXT).is_empty());
    }

    #[test]
    fn test_empty_feed() {
        assert!(extract_events(&[], CITADEL_CAP_TEXT).is_empty());
    }
}
