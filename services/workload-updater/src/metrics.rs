//! Process-wide updater metrics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters and gauges for the workload updater.
///
/// Shared across passes behind an `Arc`; all updates are relaxed atomics.
#[derive(Debug, Default)]
pub struct UpdaterMetrics {
    /// Outdated instances seen by the most recent pass.
    outdated_workloads: AtomicU64,
    /// Passes that ran to completion.
    passes: AtomicU64,
    /// Migrations created.
    migrations_created: AtomicU64,
    /// Pod evictions issued.
    evictions_issued: AtomicU64,
    /// Self-triggered migrations aborted.
    migrations_aborted: AtomicU64,
    /// Remote actions that failed.
    action_failures: AtomicU64,
}

/// Point-in-time copy of [`UpdaterMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub outdated_workloads: u64,
    pub passes: u64,
    pub migrations_created: u64,
    pub evictions_issued: u64,
    pub migrations_aborted: u64,
    pub action_failures: u64,
}

impl UpdaterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the outdated-instance gauge.
    pub fn set_outdated(&self, count: usize) {
        self.outdated_workloads
            .store(count as u64, Ordering::Relaxed);
    }

    pub fn outdated(&self) -> u64 {
        self.outdated_workloads.load(Ordering::Relaxed)
    }

    pub fn record_pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_migration_created(&self) {
        self.migrations_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abort(&self) {
        self.migrations_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.action_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            outdated_workloads: self.outdated_workloads.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
            migrations_created: self.migrations_created.load(Ordering::Relaxed),
            evictions_issued: self.evictions_issued.load(Ordering::Relaxed),
            migrations_aborted: self.migrations_aborted.load(Ordering::Relaxed),
            action_failures: self.action_failures.load(Ordering::Relaxed),
        }
    }
}
