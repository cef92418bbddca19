//! Periodic driver for batch polling passes
//!
//! Fires a `BatchPoller` pass on a fixed interval with at most one pass in
//! flight. Ticks that land while a pass is running are logged and skipped.
//! Shutdown signals cancellation, then waits a bounded time for the
//! in-flight pass to drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::DriverError;
use crate::poller::{BatchPoller, CancelSignal};
use crate::types::PollingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
}

/// Returns the gate to `Idle` when the pass task ends, including by panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PeriodicDriver {
    poller: Arc<BatchPoller>,
    tick_interval: Duration,
    shutdown_timeout: Duration,
    running: Arc<AtomicBool>,
    cancel_tx: watch::Sender<bool>,
    cancel: CancelSignal,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicDriver {
    pub fn new(poller: Arc<BatchPoller>, tick_interval: Duration, shutdown_timeout: Duration) -> Self {
        let (cancel_tx, cancel) = CancelSignal::new();
        Self {
            poller,
            tick_interval,
            shutdown_timeout,
            running: Arc::new(AtomicBool::new(false)),
            cancel_tx,
            cancel,
            in_flight: Mutex::new(None),
        }
    }

    pub fn from_config(poller: Arc<BatchPoller>, polling: &PollingConfig) -> Self {
        Self::new(poller, polling.tick_interval(), polling.shutdown_timeout())
    }

    pub fn state(&self) -> DriverState {
        if self.running.load(Ordering::Acquire) {
            DriverState::Running
        } else {
            DriverState::Idle
        }
    }

    /// Start a pass in the background unless one is already running.
    ///
    /// Returns `false` when the tick was skipped.
    pub fn try_start_pass(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::info!("Driver: previous pass still running, skipping tick");
            return false;
        }

        let guard = RunningGuard(Arc::clone(&self.running));
        let poller = Arc::clone(&self.poller);
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            match poller.run_pass(&cancel).await {
                Ok(report) => {
                    log::debug!("Driver: pass ended with {:?}", report.end);
                }
                Err(e) if e.is_retryable() => {
                    log::warn!("Driver: pass failed, retrying next tick: {}", e);
                }
                Err(e) => {
                    log::error!("Driver: pass failed: {}", e);
                }
            }
        });

        *self.in_flight.lock() = Some(handle);
        true
    }

    /// Tick until shutdown is requested. The first tick fires immediately.
    pub async fn run(&self) {
        log::info!(
            "Driver: polling every {} seconds",
            self.tick_interval.as_secs()
        );

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.try_start_pass();
                }
                _ = self.cancel.cancelled() => {
                    log::info!("Driver: shutdown requested, tick loop stopped");
                    break;
                }
            }
        }
    }

    /// Cancel the in-flight pass and wait up to the shutdown timeout for it.
    ///
    /// On timeout the pass is left detached and the error is returned so the
    /// caller can report it and continue shutting down.
    pub async fn shutdown(&self) -> Result<(), DriverError> {
        let _ = self.cancel_tx.send(true);

        let handle = self.in_flight.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };

        match tokio::time::timeout(self.shutdown_timeout, handle).await {
            Ok(Ok(())) => {
                log::info!("Driver: in-flight pass drained");
                Ok(())
            }
            Ok(Err(e)) => Err(DriverError::TaskFailed(e.to_string())),
            Err(_) => {
                log::error!(
                    "Driver: in-flight pass did not finish within {} seconds",
                    self.shutdown_timeout.as_secs()
                );
                Err(DriverError::ShutdownTimeout(self.shutdown_timeout.as_secs()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::db::test_utils::test_db;
    use crate::poller::test_support::*;
    use crate::poller::Sleeper;
    use crate::runescape::{ActivityOutcome, ActivitySource};

    /// Blocks every fetch until released, ignoring cancellation.
    #[derive(Default)]
    struct GatedActivity {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ActivitySource for GatedActivity {
        async fn fetch_activities(&self, _display_name: &str, _count: u32) -> ActivityOutcome {
            self.started.notify_one();
            self.release.notified().await;
            ActivityOutcome::Activities(Vec::new())
        }
    }

    /// Never wakes on its own; only cancellation ends the wait.
    struct StalledSleeper;

    #[async_trait]
    impl Sleeper for StalledSleeper {
        async fn sleep(&self, _duration: Duration) {
            std::future::pending::<()>().await;
        }
    }

    fn driver_with(
        roster: &[&str],
        activity: Arc<dyn ActivitySource>,
        sleeper: Arc<dyn Sleeper>,
        shutdown_timeout: Duration,
    ) -> PeriodicDriver {
        let poller = BatchPoller::new(
            Arc::new(Mutex::new(test_db())),
            Arc::new(FakeRoster::with(roster)),
            activity,
            sleeper,
            settings(),
        );
        PeriodicDriver::new(Arc::new(poller), Duration::from_secs(120), shutdown_timeout)
    }

    #[tokio::test]
    async fn test_tick_while_running_is_skipped() {
        let activity = Arc::new(GatedActivity::default());
        let driver = driver_with(
            &["Alice"],
            activity.clone(),
            Arc::new(RecordingSleeper::default()),
            Duration::from_secs(5),
        );

        assert_eq!(driver.state(), DriverState::Idle);
        assert!(driver.try_start_pass());
        activity.started.notified().await;

        assert_eq!(driver.state(), DriverState::Running);
        assert!(!driver.try_start_pass());
        assert_eq!(driver.state(), DriverState::Running);

        activity.release.notify_one();
        driver.shutdown().await.unwrap();
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[tokio::test]
    async fn test_gate_reopens_after_pass() {
        let activity = Arc::new(ScriptedActivity::default());
        let driver = driver_with(
            &["Alice"],
            activity.clone(),
            Arc::new(RecordingSleeper::default()),
            Duration::from_secs(5),
        );

        assert!(driver.try_start_pass());
        let handle = driver.in_flight.lock().take().unwrap();
        handle.await.unwrap();
        assert_eq!(driver.state(), DriverState::Idle);
        assert!(driver.try_start_pass());
        driver.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_waiting_pass() {
        let driver = driver_with(
            &["Alice", "Bob"],
            Arc::new(ScriptedActivity::default()),
            Arc::new(StalledSleeper),
            Duration::from_secs(5),
        );

        assert!(driver.try_start_pass());
        tokio::task::yield_now().await;
        driver.shutdown().await.unwrap();
        assert_eq!(driver.state(), DriverState::Idle);
        // No new passes after shutdown
        assert!(!driver.try_start_pass());
    }

    #[tokio::test]
    async fn test_shutdown_times_out_on_stuck_request() {
        let activity = Arc::new(GatedActivity::default());
        let driver = driver_with(
            &["Alice"],
            activity.clone(),
            Arc::new(RecordingSleeper::default()),
            Duration::from_millis(50),
        );

        assert!(driver.try_start_pass());
        activity.started.notified().await;

        let result = driver.shutdown().await;
        assert!(matches!(result, Err(DriverError::ShutdownTimeout(_))));
    }

    #[tokio::test]
    async fn test_shutdown_without_pass_is_ok() {
        let driver = driver_with(
            &[],
            Arc::new(ScriptedActivity::default()),
            Arc::new(RecordingSleeper::default()),
            Duration::from_secs(1),
        );
        driver.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_shutdown() {
        let driver = Arc::new(driver_with(
            &[],
            Arc::new(ScriptedActivity::default()),
            Arc::new(RecordingSleeper::default()),
            Duration::from_secs(1),
        ));
        let runner = {
            let driver = Arc::clone(&driver);
            tokio::spawn(async move { driver.run().await })
        };
        tokio::task::yield_now().await;
        driver.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .unwrap()
            .unwrap();
    }
}
