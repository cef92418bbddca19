use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::db::{DbError, EventDb};
use crate::error::ConfigError;
use crate::types::Config;

/// Environment variable naming an alternate config file.
pub const CONFIG_ENV: &str = "CAPWATCH_CONFIG";
/// Environment variable overriding `clanName`.
pub const CLAN_NAME_ENV: &str = "CAPWATCH_CLAN_NAME";

/// Shared handles for a running process: resolved config plus the store.
pub struct AppState {
    pub config: Config,
    pub db_path: PathBuf,
    pub db: Arc<Mutex<EventDb>>,
}

impl AppState {
    /// Open the writable store named by `config`.
    pub fn open(config: Config) -> Result<Self, DbError> {
        let db_path = database_path(&config)?;
        let db = EventDb::open_at(db_path.clone())?;
        log::info!(
            "Opened store at {} ({} tracked members)",
            db_path.display(),
            db.tracked_entity_count()?
        );
        Ok(Self {
            config,
            db_path,
            db: Arc::new(Mutex::new(db)),
        })
    }
}

/// Get the canonical config file path (~/.capwatch/config.json)
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
    Ok(home.join(".capwatch").join("config.json"))
}

/// Store location: `databasePath` from config, else `~/.capwatch/capwatch.db`.
pub fn database_path(config: &Config) -> Result<PathBuf, DbError> {
    match &config.database_path {
        Some(p) => Ok(p.clone()),
        None => EventDb::default_path(),
    }
}

/// Pick the config file: explicit flag, then `$CAPWATCH_CONFIG`, then the default.
pub fn resolve_config_path(
    explicit: Option<&Path>,
    env_value: Option<String>,
) -> Result<PathBuf, ConfigError> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    match env_value.filter(|v| !v.trim().is_empty()) {
        Some(v) => Ok(PathBuf::from(v)),
        None => config_path(),
    }
}

/// Load configuration, applying environment overrides and validating.
///
/// A missing file at the default location is not an error: every key has a
/// default except `clanName`, which only the poller requires.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let path = resolve_config_path(explicit, std::env::var(CONFIG_ENV).ok())?;
    let mut config = read_config_file(&path, explicit.is_some())?;
    apply_env_overrides(&mut config, std::env::var(CLAN_NAME_ENV).ok());
    config.validate()?;
    Ok(config)
}

/// Parse the config at `path`. Missing files yield defaults unless `required`.
pub fn read_config_file(path: &Path, required: bool) -> Result<Config, ConfigError> {
    if !path.exists() && !required {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn apply_env_overrides(config: &mut Config, clan_name: Option<String>) {
    if let Some(name) = clan_name.filter(|v| !v.trim().is_empty()) {
        config.clan_name = Some(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_default_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = read_config_file(&dir.path().join("config.json"), false).unwrap();
        assert!(config.clan_name.is_none());
        assert_eq!(config.polling.batch_limit, 15);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_config_file(&dir.path().join("nope.json"), true);
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_parse_error_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let err = read_config_file(&path, true).unwrap_err();
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_reads_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"clanName": "Vought", "databasePath": "/tmp/cw.db", "polling": {"tickIntervalSecs": 60}}"#,
        )
        .unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.clan_name.as_deref(), Some("Vought"));
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/cw.db")));
        assert_eq!(config.polling.tick_interval_secs, 60);
    }

    #[test]
    fn test_explicit_path_wins_over_env() {
        let explicit = PathBuf::from("/etc/capwatch.json");
        let resolved =
            resolve_config_path(Some(&explicit), Some("/from/env.json".to_string())).unwrap();
        assert_eq!(resolved, explicit);

        let resolved = resolve_config_path(None, Some("/from/env.json".to_string())).unwrap();
        assert_eq!(resolved, PathBuf::from("/from/env.json"));
    }

    #[test]
    fn test_env_clan_name_override() {
        let mut config = Config {
            clan_name: Some("Vought".to_string()),
            ..Config::default()
        };
        apply_env_overrides(&mut config, Some("The Seven".to_string()));
        assert_eq!(config.clan_name.as_deref(), Some("The Seven"));

        apply_env_overrides(&mut config, Some("  ".to_string()));
        assert_eq!(config.clan_name.as_deref(), Some("The Seven"));
    }

    #[test]
    fn test_app_state_opens_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: Some(dir.path().join("nested").join("cw.db")),
            ..Config::default()
        };
        let state = AppState::open(config).unwrap();
        assert!(state.db_path.exists());
        assert_eq!(state.db.lock().tracked_entity_count().unwrap(), 0);
    }
}
