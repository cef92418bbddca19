//! Error types for configuration, polling runs and the periodic driver.
//!
//! Per-entity fetch problems are not errors here: they are classified into
//! `ActivityOutcome` values and budgeted by the poller. Only store failures
//! fail a run, and nothing in a run is fatal to the process.

use std::path::PathBuf;

use thiserror::Error;

use crate::db::DbError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("No clan name configured. Set clanName in config or CAPWATCH_CLAN_NAME")]
    MissingClanName,

    #[error("Home directory not found")]
    HomeDirNotFound,
}

/// Failure of a single polling run.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("Store error: {0}")]
    Store(#[from] DbError),
}

impl PollError {
    /// Whether the next scheduled tick can be expected to recover.
    pub fn is_retryable(&self) -> bool {
        match self {
            PollError::Store(DbError::Sqlite(_)) => true,
            PollError::Store(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Timed out after {0} seconds waiting for the in-flight poll to finish")]
    ShutdownTimeout(u64),

    #[error("Poll task failed: {0}")]
    TaskFailed(String),
}

/// Failure of an administrative or query command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Store(#[from] DbError),

    #[error("Invalid date '{0}', expected DD-Mon-YYYY HH:MM (UTC)")]
    InvalidDate(String),

    #[error("{0}")]
    InvalidArgument(String),
}
