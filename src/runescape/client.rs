//! HTTP client for the clan roster and RuneMetrics endpoints.
//!
//! Neither endpoint needs auth. The client never retries: the poller owns
//! pacing and backoff because the rate limit is shared across all requests.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::activity::classify_response;
use super::roster::parse_roster;
use super::{ActivityOutcome, ActivitySource, FetchError, RosterMember, RosterSource};

pub const DEFAULT_ROSTER_URL: &str = "https://secure.runescape.com/m=clan-hiscores/members_lite.ws";
pub const DEFAULT_ACTIVITY_URL: &str = "https://apps.runescape.com/runemetrics/profile/profile";

const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct RuneScapeClient {
    client: reqwest::Client,
    roster_url: String,
    activity_url: String,
}

impl RuneScapeClient {
    pub fn new(roster_url: &str, activity_url: &str) -> Result<Self, FetchError> {
        // Validate up front so a typo in config fails at startup, not per request
        Url::parse(roster_url)?;
        Url::parse(activity_url)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("capwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            roster_url: roster_url.to_string(),
            activity_url: activity_url.to_string(),
        })
    }

    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::new(DEFAULT_ROSTER_URL, DEFAULT_ACTIVITY_URL)
    }

    fn roster_request_url(&self, clan_name: &str) -> Result<Url, FetchError> {
        Ok(Url::parse_with_params(
            &self.roster_url,
            &[("clanName", clan_name)],
        )?)
    }

    fn activity_request_url(&self, display_name: &str, count: u32) -> Result<Url, FetchError> {
        Ok(Url::parse_with_params(
            &self.activity_url,
            &[("user", display_name), ("activities", &count.to_string())],
        )?)
    }
}

#[async_trait]
impl RosterSource for RuneScapeClient {
    async fn fetch_roster(&self, clan_name: &str) -> Result<Vec<RosterMember>, FetchError> {
        let url = self.roster_request_url(clan_name)?;
        let resp = self.client.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FetchError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp.text().await?;
        let members = parse_roster(&body);
        if members.is_empty() {
            return Err(FetchError::RosterUnavailable(format!(
                "no members parsed for clan '{}'",
                clan_name
            )));
        }
        Ok(members)
    }
}

#[async_trait]
impl ActivitySource for RuneScapeClient {
    async fn fetch_activities(&self, display_name: &str, count: u32) -> ActivityOutcome {
        let url = match self.activity_request_url(display_name, count) {
            Ok(u) => u,
            Err(e) => return ActivityOutcome::TransientError(e.to_string()),
        };

        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return ActivityOutcome::TransientError(format!("Request failed: {}", e)),
        };

        let status = resp.status().as_u16();
        if status == 429 {
            return ActivityOutcome::RateLimited;
        }

        match resp.text().await {
            Ok(body) => classify_response(status, &body, count as usize),
            Err(e) => ActivityOutcome::TransientError(format!("Failed to read body: {}", e)),
        }
    }
}
