//! Workload updater background worker.
//!
//! Runs a pass on a periodic interval. A pass that leaves failed actions
//! behind schedules an extra retry after an exponential backoff per policy
//! key. The retry only ever comes earlier than the next tick would; the
//! periodic passes keep running whatever the backoff says.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use vmroll_reconcile::{RetryBackoff, DEFAULT_RETRY_BASE, DEFAULT_RETRY_MAX};

use crate::error::UpdaterError;
use crate::source::SnapshotSource;
use crate::updater::{PassReport, WorkloadUpdater};

/// Backoff key used when the snapshot itself cannot be loaded.
const SNAPSHOT_KEY: &str = "snapshot";

/// Worker that drives the updater from a snapshot source.
pub struct UpdaterWorker {
    source: Box<dyn SnapshotSource>,
    updater: WorkloadUpdater,
    interval: Duration,
    backoff: RetryBackoff,
}

impl UpdaterWorker {
    /// Create a new worker.
    pub fn new(source: Box<dyn SnapshotSource>, updater: WorkloadUpdater, interval: Duration) -> Self {
        Self {
            source,
            updater,
            interval,
            backoff: RetryBackoff::new(DEFAULT_RETRY_BASE, DEFAULT_RETRY_MAX),
        }
    }

    pub fn with_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn updater(&self) -> &WorkloadUpdater {
        &self.updater
    }

    /// Load a snapshot and run a single pass.
    pub async fn run_once(&mut self) -> Result<PassReport, UpdaterError> {
        let snapshot = self.source.snapshot().await?;
        self.updater
            .reconcile(&snapshot, Instant::now())
            .await
            .into_result()
    }

    /// Run the worker until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            target_version = %self.updater.config().target_version,
            "Starting workload updater worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut retry_at: Option<Instant> = None;

        loop {
            let retry = async move {
                match retry_at {
                    Some(at) => tokio::time::sleep_until(at.into()).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = interval.tick() => {
                    retry_at = self.tick().await.map(|delay| Instant::now() + delay);
                }
                _ = retry => {
                    debug!("Retrying failed pass");
                    retry_at = self.tick().await.map(|delay| Instant::now() + delay);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Workload updater worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Load a snapshot and run one pass.
    ///
    /// Returns the delay before an early retry when the snapshot could not
    /// be loaded or the pass left failures behind.
    pub async fn tick(&mut self) -> Option<Duration> {
        let snapshot = match self.source.snapshot().await {
            Ok(snapshot) => {
                self.backoff.clear(SNAPSHOT_KEY);
                snapshot
            }
            Err(e) => {
                let delay = self.backoff.record_failure(SNAPSHOT_KEY);
                warn!(
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Failed to load fleet snapshot"
                );
                return Some(delay);
            }
        };

        let report = self.updater.reconcile(&snapshot, Instant::now()).await;
        let policy = report.policy.as_ref()?.to_string();

        match report.into_result() {
            Ok(_) => {
                self.backoff.clear(&policy);
                None
            }
            Err(e) => {
                let delay = self.backoff.record_failure(&policy);
                warn!(
                    error = %e,
                    failures = self.backoff.failures(&policy),
                    retry_in_ms = delay.as_millis() as u64,
                    "Workload update pass failed"
                );
                Some(delay)
            }
        }
    }
}
