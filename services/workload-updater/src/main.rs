//! vmroll Workload Updater
//!
//! Reads a fleet snapshot on every pass and rolls outdated instances to the
//! target launcher version by live migration or eviction.
//!
//! No orchestration API client is wired in yet: intents are issued through
//! the dry-run orchestrator, which logs them.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vmroll_workload_updater::config::Config;
use vmroll_workload_updater::{
    DryRunOrchestrator, FileSnapshotSource, TracingRecorder, UpdaterMetrics, UpdaterWorker,
    WorkloadUpdater,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        target_version = %config.target_version,
        parallel_migrations = config.parallel_migrations,
        resync_interval_ms = config.resync_interval.as_millis() as u64,
        snapshot_file = %config.snapshot_file.display(),
        "Starting vmroll workload updater"
    );

    let metrics = Arc::new(UpdaterMetrics::new());
    let updater = WorkloadUpdater::new(
        config.updater_config(),
        Arc::new(DryRunOrchestrator::new()),
        Arc::new(TracingRecorder),
        Arc::clone(&metrics),
    );
    let mut worker = UpdaterWorker::new(
        Box::new(FileSnapshotSource::new(config.snapshot_file.clone())),
        updater,
        config.resync_interval,
    );

    if config.once {
        let report = worker.run_once().await?;
        info!(
            outdated = report.outdated,
            migrations_created = report.migrations.succeeded,
            evictions = report.evictions.succeeded,
            aborted = report.aborts.succeeded,
            conditions_cleared = report.conditions.succeeded,
            "Single pass complete"
        );
        return Ok(());
    }

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut worker_handle = tokio::spawn(worker.run(shutdown_rx));

    let worker_exited = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            false
        }
        result = &mut worker_handle => {
            if let Err(e) = result {
                error!(error = %e, "Worker task panicked");
            }
            true
        }
    };

    // Signal shutdown to the worker and let the current pass finish
    let _ = shutdown_tx.send(true);
    if !worker_exited {
        info!("Waiting for worker to shut down...");
        if let Err(e) = worker_handle.await {
            error!(error = %e, "Worker task panicked");
        }
    }

    let totals = metrics.snapshot();
    info!(
        passes = totals.passes,
        migrations_created = totals.migrations_created,
        evictions_issued = totals.evictions_issued,
        migrations_aborted = totals.migrations_aborted,
        action_failures = totals.action_failures,
        "Workload updater shutdown complete"
    );
    Ok(())
}
