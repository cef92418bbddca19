use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::extractor::CITADEL_CAP_TEXT;
use crate::runescape::client::{DEFAULT_ACTIVITY_URL, DEFAULT_ROSTER_URL};
use crate::runescape::DEFAULT_ACTIVITY_COUNT;

/// Configuration stored in ~/.capwatch/config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clan_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_roster_url")]
    pub roster_url: String,
    #[serde(default = "default_activity_url")]
    pub activity_url: String,
    #[serde(default = "default_activity_count")]
    pub activity_count: u32,
    /// Activity text that counts as one occurrence of the tracked event.
    #[serde(default = "default_event_text")]
    pub event_text: String,
    #[serde(default)]
    pub polling: PollingConfig,
}

fn default_roster_url() -> String {
    DEFAULT_ROSTER_URL.to_string()
}

fn default_activity_url() -> String {
    DEFAULT_ACTIVITY_URL.to_string()
}

fn default_activity_count() -> u32 {
    DEFAULT_ACTIVITY_COUNT
}

fn default_event_text() -> String {
    CITADEL_CAP_TEXT.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clan_name: None,
            database_path: None,
            roster_url: default_roster_url(),
            activity_url: default_activity_url(),
            activity_count: default_activity_count(),
            event_text: default_event_text(),
            polling: PollingConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_text.trim().is_empty() {
            return Err(ConfigError::Invalid("eventText must not be empty".to_string()));
        }
        if self.activity_count == 0 {
            return Err(ConfigError::Invalid("activityCount must be at least 1".to_string()));
        }
        self.polling.validate()
    }

    /// Clan name, or an error when the poller is started without one.
    pub fn require_clan_name(&self) -> Result<&str, ConfigError> {
        self.clan_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(ConfigError::MissingClanName)
    }
}

/// Scheduler tunables. Durations are named by unit in their key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Max entities queried per run.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// Fixed pause before every activity request.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: u64,
    /// The run aborts once the doubled backoff exceeds this.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// The run aborts once transient failures exceed this.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_recent_window_days")]
    pub recent_window_days: u32,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
    #[serde(default = "default_staleness_hours")]
    pub staleness_hours: u32,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_tick_interval_secs() -> u64 {
    120
}

fn default_batch_limit() -> usize {
    15
}

fn default_request_delay_ms() -> u64 {
    1_000
}

fn default_base_backoff_secs() -> u64 {
    10
}

fn default_max_backoff_secs() -> u64 {
    100
}

fn default_max_failures() -> u32 {
    5
}

fn default_recent_window_days() -> u32 {
    7
}

fn default_cooldown_minutes() -> u32 {
    10
}

fn default_staleness_hours() -> u32 {
    24
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            batch_limit: default_batch_limit(),
            request_delay_ms: default_request_delay_ms(),
            base_backoff_secs: default_base_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            max_failures: default_max_failures(),
            recent_window_days: default_recent_window_days(),
            cooldown_minutes: default_cooldown_minutes(),
            staleness_hours: default_staleness_hours(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl PollingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_limit == 0 {
            return Err(ConfigError::Invalid("polling.batchLimit must be at least 1".to_string()));
        }
        if self.base_backoff_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling.baseBackoffSecs must be at least 1".to_string(),
            ));
        }
        if self.max_backoff_secs < self.base_backoff_secs {
            return Err(ConfigError::Invalid(format!(
                "polling.maxBackoffSecs ({}) is below baseBackoffSecs ({})",
                self.max_backoff_secs, self.base_backoff_secs
            )));
        }
        if self.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling.tickIntervalSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_secs(self.base_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn recent_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.recent_window_days))
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.cooldown_minutes))
    }

    pub fn staleness(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.staleness_hours))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.event_text, "Capped at my Clan Citadel.");
        assert_eq!(config.activity_count, 20);
        assert_eq!(config.polling, PollingConfig::default());
        assert_eq!(config.polling.batch_limit, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_polling_override() {
        let config: Config = serde_json::from_str(
            r#"{"clanName": "Vought", "polling": {"batchLimit": 3, "maxFailures": 2}}"#,
        )
        .unwrap();
        assert_eq!(config.require_clan_name().unwrap(), "Vought");
        assert_eq!(config.polling.batch_limit, 3);
        assert_eq!(config.polling.max_failures, 2);
        assert_eq!(config.polling.base_backoff_secs, 10);
    }

    #[test]
    fn test_missing_clan_name() {
        let config = Config {
            clan_name: Some("   ".to_string()),
            ..Config::default()
        };
        assert!(matches!(
            config.require_clan_name(),
            Err(ConfigError::MissingClanName)
        ));
    }

    #[test]
    fn test_validation_rejects_inverted_backoff() {
        let polling = PollingConfig {
            base_backoff_secs: 50,
            max_backoff_secs: 10,
            ..PollingConfig::default()
        };
        assert!(polling.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_batch() {
        let polling = PollingConfig {
            batch_limit: 0,
            ..PollingConfig::default()
        };
        assert!(polling.validate().is_err());
    }
}
