//! RuneScape web APIs: clan roster (members_lite) and RuneMetrics activity feed.
//!
//! Modules:
//! - activity: RuneMetrics profile response classification
//! - client: reqwest-backed implementation of both sources
//! - roster: clan members_lite CSV parsing
//!
//! The scheduler only sees the `RosterSource` / `ActivitySource` traits, so
//! it can be driven by in-memory fakes in tests.

pub mod activity;
pub mod client;
pub mod roster;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::RuneScapeClient;

/// Default number of recent activity records requested per profile.
pub const DEFAULT_ACTIVITY_COUNT: u32 = 20;

/// Error value RuneMetrics returns for profiles hidden from the public.
pub const PROFILE_PRIVATE: &str = "PROFILE_PRIVATE";

// ============================================================================
// Types
// ============================================================================

/// One clan member line from the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterMember {
    pub display_name: String,
    pub rank: String,
    pub total_xp: i64,
    pub kills: i64,
}

/// One activity record from a RuneMetrics profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Unix seconds (UTC), parsed from the feed's `date`.
    pub timestamp: i64,
    pub details: String,
    /// Signature text, e.g. `Capped at my Clan Citadel.`
    pub text: String,
}

/// Classified result of one activity fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityOutcome {
    /// Most-recent-first, possibly empty.
    Activities(Vec<Activity>),
    /// The profile is private.
    Inaccessible,
    /// Upstream answered 429.
    RateLimited,
    /// Anything else worth retrying on a later run.
    TransientError(String),
}

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("Roster unavailable: {0}")]
    RosterUnavailable(String),
}

// ============================================================================
// Source traits
// ============================================================================

/// Lists the current members of a clan.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn fetch_roster(&self, clan_name: &str) -> Result<Vec<RosterMember>, FetchError>;
}

/// Fetches one member's recent activity. Exactly one request per call, no retries.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn fetch_activities(&self, display_name: &str, count: u32) -> ActivityOutcome;
}
