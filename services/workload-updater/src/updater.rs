//! The reconciliation pass.
//!
//! One pass reads a snapshot and, for the update policy it contains:
//!
//! 1. Counts outdated instances, sets the gauge and patches the policy status
//! 2. Aborts self-triggered migrations whose trigger went away
//! 3. Reserves migration slots and the eviction budget up front
//! 4. Creates migrations and evicts pods concurrently
//!
//! Nothing happens while the policy's own deployment is still in progress.
//! Actions issued by earlier passes are remembered until a snapshot shows
//! them, so a lagging snapshot never causes the same action twice.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, field, info, instrument, Span};
use vmroll_id::{ObjectKey, PassId};
use vmroll_model::{FleetSnapshot, UpdateMethod};
use vmroll_reconcile::{EvictionGate, MigrationSlots, DEFAULT_EXPECTATION_TTL};

use crate::abort;
use crate::classifier::classify;
use crate::dispatch::{ActionContext, Outcome};
use crate::error::UpdaterError;
use crate::eviction;
use crate::metrics::UpdaterMetrics;
use crate::migration;
use crate::orchestrator::Orchestrator;
use crate::pending::PendingActions;
use crate::recorder::EventRecorder;
use crate::status::{self, StatusOutcome};

/// Default cluster-wide cap on unfinished migrations.
pub const DEFAULT_PARALLEL_MIGRATIONS: u32 = 5;

/// Updater settings.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Launcher version instances should run.
    pub target_version: String,

    /// Cluster-wide cap on unfinished migrations.
    pub parallel_migrations: u32,

    /// How long an issued action may stay absent from snapshots before it
    /// is assumed lost and may be issued again.
    pub expectation_ttl: Duration,
}

impl UpdaterConfig {
    pub fn new(target_version: impl Into<String>) -> Self {
        Self {
            target_version: target_version.into(),
            parallel_migrations: DEFAULT_PARALLEL_MIGRATIONS,
            expectation_ttl: DEFAULT_EXPECTATION_TTL,
        }
    }

    pub fn with_parallel_migrations(mut self, limit: u32) -> Self {
        self.parallel_migrations = limit;
        self
    }

    pub fn with_expectation_ttl(mut self, ttl: Duration) -> Self {
        self.expectation_ttl = ttl;
        self
    }
}

/// Why a pass did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The snapshot carries no update policy.
    NoPolicy,
    /// The policy's own deployment has not finished.
    NotDeployed,
}

/// Outcome of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub pass_id: PassId,
    pub policy: Option<ObjectKey>,
    pub skipped: Option<SkipReason>,
    pub outdated: usize,
    pub status: Option<StatusOutcome>,
    pub aborts: Outcome,
    /// Pending-change conditions cleared after requested aborts.
    pub conditions: Outcome,
    pub migrations: Outcome,
    pub evictions: Outcome,
}

impl PassReport {
    fn new(pass_id: PassId) -> Self {
        Self {
            pass_id,
            policy: None,
            skipped: None,
            outdated: 0,
            status: None,
            aborts: Outcome::default(),
            conditions: Outcome::default(),
            migrations: Outcome::default(),
            evictions: Outcome::default(),
        }
    }

    /// Failed remote actions, including a failed status patch.
    ///
    /// A failed condition clear is not counted: the migration it followed is
    /// already gone, so a retried pass would not attempt it again.
    pub fn failures(&self) -> usize {
        let status_failed = usize::from(self.status == Some(StatusOutcome::Failed));
        self.aborts.failed + self.migrations.failed + self.evictions.failed + status_failed
    }

    /// Convert into an error when any action failed, so the caller backs off.
    pub fn into_result(self) -> Result<Self, UpdaterError> {
        let failures = self.failures();
        match (&self.policy, failures) {
            (Some(policy), failures) if failures > 0 => Err(UpdaterError::PassFailed {
                pass_id: self.pass_id,
                policy: policy.clone(),
                failures,
            }),
            _ => Ok(self),
        }
    }
}

/// Rolls outdated instances to the target version, one pass at a time.
pub struct WorkloadUpdater {
    config: UpdaterConfig,
    orchestrator: Arc<dyn Orchestrator>,
    recorder: Arc<dyn EventRecorder>,
    metrics: Arc<UpdaterMetrics>,

    /// Eviction batch clocks per policy key. Not persisted.
    gates: HashMap<ObjectKey, EvictionGate>,

    /// Actions not yet reflected in a snapshot, per policy key.
    pending: HashMap<ObjectKey, PendingActions>,
}

impl WorkloadUpdater {
    pub fn new(
        config: UpdaterConfig,
        orchestrator: Arc<dyn Orchestrator>,
        recorder: Arc<dyn EventRecorder>,
        metrics: Arc<UpdaterMetrics>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            recorder,
            metrics,
            gates: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn metrics(&self) -> &UpdaterMetrics {
        &self.metrics
    }

    /// Run one pass against `snapshot` at time `now`.
    #[instrument(name = "workload_update_pass", skip_all, fields(pass_id = tracing::field::Empty))]
    pub async fn reconcile(&mut self, snapshot: &FleetSnapshot, now: Instant) -> PassReport {
        let pass_id = PassId::new();
        Span::current().record("pass_id", field::display(pass_id));

        let mut report = PassReport::new(pass_id);
        let target_version = self.config.target_version.as_str();
        let classification = classify(snapshot, target_version);
        report.outdated = classification.outdated_count();

        let Some(policy) = snapshot.policy() else {
            self.metrics.set_outdated(report.outdated);
            debug!("No update policy, nothing to do");
            report.skipped = Some(SkipReason::NoPolicy);
            return report;
        };
        report.policy = Some(policy.key.clone());

        if !policy.is_deployed() {
            info!(policy = %policy.key, "Policy deployment in progress, waiting");
            report.skipped = Some(SkipReason::NotDeployed);
            return report;
        }

        self.metrics.set_outdated(report.outdated);

        let ctx = ActionContext {
            orchestrator: self.orchestrator.as_ref(),
            recorder: self.recorder.as_ref(),
            metrics: &self.metrics,
            pass_id,
        };

        let outdated = u32::try_from(report.outdated).unwrap_or(u32::MAX);
        report.status = Some(status::report_outdated(ctx.orchestrator, policy, outdated).await);

        let aborts = abort::plan_aborts(snapshot, target_version);
        let aborted = abort::abort_migrations(ctx, &aborts).await;
        report.aborts = aborted.aborts;
        report.conditions = aborted.conditions;

        let live_migrate = policy.allows(UpdateMethod::LiveMigrate);
        let evict = policy.allows(UpdateMethod::Evict);

        let ttl = self.config.expectation_ttl;
        let pending = self
            .pending
            .entry(policy.key.clone())
            .or_insert_with(|| PendingActions::new(ttl));
        pending.settle(snapshot, now);

        if live_migrate || evict {
            let migration_candidates = if live_migrate {
                let mut slots = MigrationSlots::reserve(
                    self.config.parallel_migrations,
                    snapshot.unfinished_migration_count() + pending.unobserved_migrations(),
                );
                migration::select_candidates(&classification, snapshot, pending, &mut slots)
            } else {
                Vec::new()
            };

            let gate = self.gates.entry(policy.key.clone()).or_default();
            let budget = evict.then(|| {
                gate.reserve(
                    now,
                    policy.batch_eviction_interval(),
                    policy.batch_eviction_size(),
                )
            });
            let eviction_batch = match budget {
                Some(budget) if !budget.is_empty() => {
                    let eligible = eviction::eligible(&classification, snapshot, live_migrate);
                    eviction::select_batch(&eligible, snapshot, pending, budget.granted())
                }
                Some(_) => {
                    debug!(policy = %policy.key, "Eviction batch interval not elapsed");
                    Vec::new()
                }
                None => Vec::new(),
            };

            let (migrations, evictions) = tokio::join!(
                migration::create_migrations(ctx, &migration_candidates),
                eviction::evict(ctx, &eviction_batch),
            );
            report.migrations = migrations.outcome();
            report.evictions = evictions.outcome();

            for migration in migrations.accepted {
                pending.migration_created(migration.target_key(), migration.key, now);
            }
            for target in &evictions.accepted {
                pending.evicted(target.instance.key.clone(), target.pod.uid.clone(), now);
            }
            for target in &evictions.failed {
                pending.eviction_refused(target.instance.key.clone());
            }

            if let Some(budget) = budget {
                gate.commit(budget, report.evictions.attempted());
            }
        } else {
            debug!(policy = %policy.key, "No update methods enabled");
        }

        self.metrics.record_pass();
        if report.aborts.attempted() + report.migrations.attempted() + report.evictions.attempted() > 0
        {
            info!(
                policy = %policy.key,
                outdated = report.outdated,
                migrations_created = report.migrations.succeeded,
                evictions = report.evictions.succeeded,
                aborted = report.aborts.succeeded,
                conditions_cleared = report.conditions.succeeded,
                failures = report.failures(),
                "Workload update pass complete"
            );
        } else {
            debug!(policy = %policy.key, outdated = report.outdated, "Workload update pass complete");
        }

        report
    }
}
