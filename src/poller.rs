//! Batch poller: one staleness-prioritized pass over the clan roster.
//!
//! A pass refreshes the roster, selects the stalest eligible members (up to
//! `batch_limit`), fetches their activity feeds one at a time under a shared
//! backoff, and reconciles everything it learned in a single transaction.
//!
//! Aborts (backoff ceiling, failure budget, cancellation) stop fetching but
//! never discard results: whatever was gathered is still reconciled. A store
//! failure during reconciliation writes nothing, so the next pass retries the
//! same members from a consistent state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use crate::db::{DbOccurrence, EventDb, PollingUpdate, ReconcileSummary, SelectionCutoffs};
use crate::error::{ConfigError, PollError};
use crate::extractor::extract_events;
use crate::runescape::activity::latest_timestamp;
use crate::runescape::{ActivityOutcome, ActivitySource, RosterSource};
use crate::types::Config;
use crate::util::{now_timestamp, offset_from};

// ============================================================================
// Sleeping and cancellation
// ============================================================================

/// Suspension point used for request pacing and backoff.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Cooperative cancellation flag, checked between fetches and during waits.
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// A signal that never fires (one-shot CLI runs).
    pub fn never() -> Self {
        let (_tx, signal) = Self::new();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Pends forever if the sender is gone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Exponential backoff for 429 responses: starts at `base`, doubles per
/// consecutive rate limit, exhausted once it exceeds `ceiling`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self {
            base,
            ceiling,
            current: base,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// Double the delay. Returns `false` when the new delay exceeds the ceiling.
    pub fn escalate(&mut self) -> bool {
        self.current = self.current.saturating_mul(2);
        self.current <= self.ceiling
    }
}

// ============================================================================
// Settings and reports
// ============================================================================

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub clan_name: String,
    pub activity_count: u32,
    pub event_text: String,
    pub batch_limit: usize,
    pub request_delay: Duration,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub max_failures: u32,
    pub recent_window: chrono::Duration,
    pub cooldown: chrono::Duration,
    pub staleness: chrono::Duration,
}

impl PollerSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let polling = &config.polling;
        Ok(Self {
            clan_name: config.require_clan_name()?.to_string(),
            activity_count: config.activity_count,
            event_text: config.event_text.clone(),
            batch_limit: polling.batch_limit,
            request_delay: polling.request_delay(),
            base_backoff: polling.base_backoff(),
            max_backoff: polling.max_backoff(),
            max_failures: polling.max_failures,
            recent_window: polling.recent_window(),
            cooldown: polling.cooldown(),
            staleness: polling.staleness(),
        })
    }

    pub fn cutoffs(&self, now: i64) -> SelectionCutoffs {
        SelectionCutoffs {
            recent_activity_after: offset_from(now, self.recent_window),
            cooldown_polled_before: offset_from(now, self.cooldown),
            stale_polled_before: offset_from(now, self.staleness),
        }
    }
}

/// Why the fetch loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunEnd {
    NoCandidates,
    Completed,
    Cancelled,
    BackoffExhausted,
    FailureBudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub roster_refreshed: bool,
    pub new_members: usize,
    pub candidates: usize,
    pub polled: usize,
    pub matches_found: usize,
    pub occurrences_inserted: usize,
    pub inaccessible: usize,
    pub failures: u32,
    pub rate_limited: u32,
    pub end: RunEnd,
}

/// Everything gathered by the fetch loop, pending reconciliation.
#[derive(Debug)]
struct PollResults {
    occurrences: Vec<DbOccurrence>,
    updates: Vec<PollingUpdate>,
    failures: u32,
    rate_limited: u32,
    end: RunEnd,
}

// ============================================================================
// Poller
// ============================================================================

pub struct BatchPoller {
    db: Arc<Mutex<EventDb>>,
    roster: Arc<dyn RosterSource>,
    activity: Arc<dyn ActivitySource>,
    sleeper: Arc<dyn Sleeper>,
    settings: PollerSettings,
}

impl BatchPoller {
    pub fn new(
        db: Arc<Mutex<EventDb>>,
        roster: Arc<dyn RosterSource>,
        activity: Arc<dyn ActivitySource>,
        sleeper: Arc<dyn Sleeper>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            db,
            roster,
            activity,
            sleeper,
            settings,
        }
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    /// Run one full pass: roster refresh, selection, fetch loop, reconciliation.
    pub async fn run_pass(&self, cancel: &CancelSignal) -> Result<BatchReport, PollError> {
        let started = std::time::Instant::now();

        let new_members = self.refresh_roster().await;

        let candidates = self.select_candidates(now_timestamp())?;
        if candidates.is_empty() {
            log::debug!("Poller: no members due for a check");
            return Ok(BatchReport {
                roster_refreshed: new_members.is_some(),
                new_members: new_members.unwrap_or(0),
                candidates: 0,
                polled: 0,
                matches_found: 0,
                occurrences_inserted: 0,
                inaccessible: 0,
                failures: 0,
                rate_limited: 0,
                end: RunEnd::NoCandidates,
            });
        }

        log::info!("Poller: checking {} members", candidates.len());
        let results = self.poll_candidates(&candidates, cancel).await;

        let summary = self.reconcile(&results, now_timestamp())?;

        let report = BatchReport {
            roster_refreshed: new_members.is_some(),
            new_members: new_members.unwrap_or(0),
            candidates: candidates.len(),
            polled: results.updates.len(),
            matches_found: results.occurrences.len(),
            occurrences_inserted: summary.occurrences_inserted,
            inaccessible: results
                .updates
                .iter()
                .filter(|u| matches!(u, PollingUpdate::Inaccessible { .. }))
                .count(),
            failures: results.failures,
            rate_limited: results.rate_limited,
            end: results.end,
        };

        log::info!(
            "Poller: pass finished ({:?}) after {:.1}s: polled {}/{}, {} new occurrences, {} private, {} failures",
            report.end,
            started.elapsed().as_secs_f64(),
            report.polled,
            report.candidates,
            report.occurrences_inserted,
            report.inaccessible,
            report.failures
        );

        Ok(report)
    }

    /// Fetch the roster and seed new members. `None` when the roster could not
    /// be refreshed; the pass then continues with the rows already stored.
    async fn refresh_roster(&self) -> Option<usize> {
        let clan = &self.settings.clan_name;
        log::info!("Roster: fetching members for {}", clan);

        let members = match self.roster.fetch_roster(clan).await {
            Ok(m) => m,
            Err(e) => {
                log::warn!("Roster: failed to fetch members for {}: {}", clan, e);
                return None;
            }
        };

        let names: Vec<String> = members.into_iter().map(|m| m.display_name).collect();
        let db = self.db.lock();
        match db.with_transaction(|tx| tx.upsert_roster(&names)) {
            Ok(added) => {
                if added > 0 {
                    log::info!("Roster: added {} new members ({} total)", added, names.len());
                }
                Some(added)
            }
            Err(e) => {
                log::warn!("Roster: failed to store members: {}", e);
                None
            }
        }
    }

    /// Stalest eligible members as of `now`, truncated to the batch limit.
    pub fn select_candidates(&self, now: i64) -> Result<Vec<String>, PollError> {
        let cutoffs = self.settings.cutoffs(now);
        let db = self.db.lock();
        Ok(db.select_candidates(&cutoffs, self.settings.batch_limit)?)
    }

    /// Sequential fetch loop over `candidates` in order.
    async fn poll_candidates(&self, candidates: &[String], cancel: &CancelSignal) -> PollResults {
        let mut results = PollResults {
            occurrences: Vec::new(),
            updates: Vec::new(),
            failures: 0,
            rate_limited: 0,
            end: RunEnd::Completed,
        };
        let mut backoff = Backoff::new(self.settings.base_backoff, self.settings.max_backoff);
        let mut index = 0;

        while index < candidates.len() {
            if cancel.is_cancelled() {
                log::info!("Poller: cancelled with {} members left", candidates.len() - index);
                results.end = RunEnd::Cancelled;
                break;
            }

            // Steady-state pacing, separate from backoff
            if !self.pause(self.settings.request_delay, cancel).await {
                results.end = RunEnd::Cancelled;
                break;
            }

            let entity_id = &candidates[index];
            log::debug!("Poller: fetching activities for {}", entity_id);

            match self.fetch(entity_id).await {
                ActivityOutcome::Activities(activities) => {
                    for event in extract_events(&activities, &self.settings.event_text) {
                        results
                            .occurrences
                            .push(DbOccurrence::auto(entity_id, event.timestamp));
                    }
                    let update = match latest_timestamp(&activities) {
                        Some(latest) => PollingUpdate::Active {
                            entity_id: entity_id.clone(),
                            latest_activity_at: latest,
                        },
                        None => PollingUpdate::Readable {
                            entity_id: entity_id.clone(),
                        },
                    };
                    results.updates.push(update);
                    backoff.reset();
                    index += 1;
                }
                ActivityOutcome::Inaccessible => {
                    log::warn!("Poller: activity log for {} is private", entity_id);
                    results.updates.push(PollingUpdate::Inaccessible {
                        entity_id: entity_id.clone(),
                    });
                    index += 1;
                }
                ActivityOutcome::RateLimited => {
                    results.rate_limited += 1;
                    let wait = backoff.current();
                    log::warn!("Poller: rate limited. Waiting {} seconds", wait.as_secs());
                    if !self.pause(wait, cancel).await {
                        results.end = RunEnd::Cancelled;
                        break;
                    }
                    if !backoff.escalate() {
                        log::error!("Poller: max backoff exceeded. Skipping further requests");
                        results.end = RunEnd::BackoffExhausted;
                        break;
                    }
                    // Same member again
                }
                ActivityOutcome::TransientError(cause) => {
                    log::warn!("Poller: failed to fetch activities for {}: {}", entity_id, cause);
                    results.failures += 1;
                    results.updates.push(PollingUpdate::Polled {
                        entity_id: entity_id.clone(),
                    });
                    if results.failures > self.settings.max_failures {
                        log::error!(
                            "Poller: exceeded {} failures. Stopping further queries",
                            self.settings.max_failures
                        );
                        results.end = RunEnd::FailureBudgetExhausted;
                        break;
                    }
                    index += 1;
                }
            }
        }

        results
    }

    /// One fetch on its own task so a panicking source counts as a transient
    /// failure instead of tearing down the pass.
    async fn fetch(&self, entity_id: &str) -> ActivityOutcome {
        let source = Arc::clone(&self.activity);
        let name = entity_id.to_string();
        let count = self.settings.activity_count;
        match tokio::spawn(async move { source.fetch_activities(&name, count).await }).await {
            Ok(outcome) => outcome,
            Err(e) => ActivityOutcome::TransientError(format!("fetch task failed: {}", e)),
        }
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn pause(&self, duration: Duration, cancel: &CancelSignal) -> bool {
        tokio::select! {
            _ = self.sleeper.sleep(duration) => true,
            _ = cancel.cancelled() => false,
        }
    }

    fn reconcile(&self, results: &PollResults, now: i64) -> Result<ReconcileSummary, PollError> {
        let db = self.db.lock();
        let summary = db
            .reconcile(&results.occurrences, &results.updates, now)
            .map_err(|e| {
                log::error!("Poller: reconciliation failed, nothing written: {}", e);
                e
            })?;
        log::debug!(
            "Poller: inserted {} occurrences, updated {} polling rows",
            summary.occurrences_inserted,
            summary.states_updated
        );
        Ok(summary)
    }
}
