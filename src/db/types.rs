//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),
}

/// How an occurrence was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccurrenceSource {
    /// Detected in an entity's activity feed by the poller.
    Auto,
    /// Entered by an operator.
    Manual,
}

impl OccurrenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccurrenceSource::Auto => "auto",
            OccurrenceSource::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(OccurrenceSource::Auto),
            "manual" => Some(OccurrenceSource::Manual),
            _ => None,
        }
    }
}

/// A row from the `occurrences` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbOccurrence {
    pub entity_id: String,
    /// Unix seconds (UTC).
    pub occurred_at: i64,
    pub source: OccurrenceSource,
    pub recorded_by: Option<String>,
}

impl DbOccurrence {
    pub fn auto(entity_id: &str, occurred_at: i64) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            occurred_at,
            source: OccurrenceSource::Auto,
            recorded_by: None,
        }
    }

    pub fn manual(entity_id: &str, occurred_at: i64, operator: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            occurred_at,
            source: OccurrenceSource::Manual,
            recorded_by: Some(operator.to_string()),
        }
    }
}

/// A row from the `polling_state` table.
///
/// Timestamps are Unix seconds; `0` means "never".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbPollingState {
    pub entity_id: String,
    pub last_activity_at: i64,
    pub last_polled_at: i64,
    pub inaccessible: bool,
}

/// Time windows that drive candidate selection, already resolved to absolute
/// cutoffs against a single "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionCutoffs {
    /// Activity at or after this is "recent".
    pub recent_activity_after: i64,
    /// Entities polled at or after this are still cooling down.
    pub cooldown_polled_before: i64,
    /// Entities polled before this are stale and always selected.
    pub stale_polled_before: i64,
}

/// What a single poll learned about one entity, applied during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollingUpdate {
    /// Feed was readable and returned at least one record; carries the most recent timestamp.
    Active { entity_id: String, latest_activity_at: i64 },
    /// Feed was readable but empty.
    Readable { entity_id: String },
    /// Query failed transiently; only the poll time is recorded.
    Polled { entity_id: String },
    /// Feed is private.
    Inaccessible { entity_id: String },
}

impl PollingUpdate {
    pub fn entity_id(&self) -> &str {
        match self {
            PollingUpdate::Active { entity_id, .. }
            | PollingUpdate::Readable { entity_id }
            | PollingUpdate::Polled { entity_id }
            | PollingUpdate::Inaccessible { entity_id } => entity_id,
        }
    }
}

/// Row counts written by one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub occurrences_inserted: usize,
    pub states_updated: usize,
}

/// Row counts moved by an entity remap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemapSummary {
    pub occurrences_moved: usize,
    pub occurrences_dropped: usize,
    pub state_merged: bool,
}
