//! Cancellation of self-triggered migrations whose trigger went away.
//!
//! A migration the updater created for a pending in-place change (memory
//! resize, vCPU hotplug, ...) is deleted again when:
//!
//! - an operator sets the abort marker on the instance, or
//! - the pending-change condition has cleared and the instance is not
//!   outdated by version either.
//!
//! Migrations in a terminal phase are never touched.

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};
use vmroll_events::EventReason;
use vmroll_model::{FleetSnapshot, Instance, Migration};
use vmroll_reconcile::ConditionalPatch;

use crate::classifier::is_version_outdated;
use crate::dispatch::{ActionContext, Outcome};

/// Pointer tokens of an instance's condition list.
pub const CONDITIONS_PATH: &[&str] = &["status", "conditions"];

/// Why a migration is being aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The instance carries the abort marker.
    Requested,
    /// The change that triggered the migration is no longer pending.
    ChangeCleared,
}

/// A migration to delete and the instance it targets.
#[derive(Debug, Clone, Copy)]
pub struct AbortPlan<'a> {
    pub migration: &'a Migration,
    pub instance: &'a Instance,
    pub reason: AbortReason,
}

/// Decide whether a self-triggered migration of `instance` must be aborted.
pub fn should_abort(instance: &Instance, target_version: &str) -> Option<AbortReason> {
    if instance.abort_requested {
        return Some(AbortReason::Requested);
    }
    if is_version_outdated(instance, target_version) {
        return None;
    }
    (!instance.has_pending_change()).then_some(AbortReason::ChangeCleared)
}

/// Scan unfinished self-triggered migrations for ones to abort.
///
/// Migrations whose target instance is not in the snapshot are skipped.
pub fn plan_aborts<'a>(snapshot: &'a FleetSnapshot, target_version: &str) -> Vec<AbortPlan<'a>> {
    let mut plans = Vec::new();
    for migration in snapshot.unfinished_migrations().filter(|m| m.self_triggered) {
        let Some(instance) = snapshot.instance(&migration.target_key()) else {
            debug!(migration = %migration.key, "Target instance not found, skipping");
            continue;
        };
        if let Some(reason) = should_abort(instance, target_version) {
            plans.push(AbortPlan {
                migration,
                instance,
                reason,
            });
        }
    }
    plans
}

/// Patch that drops pending-change conditions, guarded by the conditions
/// observed in the snapshot.
pub fn clear_pending_changes(instance: &Instance) -> Result<ConditionalPatch, serde_json::Error> {
    let observed = serde_json::to_value(&instance.conditions)?;
    let remaining: Vec<_> = instance
        .conditions
        .iter()
        .filter(|c| !c.type_.is_pending_change())
        .collect();
    let remaining: Value = serde_json::to_value(remaining)?;

    Ok(ConditionalPatch::new().set(CONDITIONS_PATH, Some(observed), remaining))
}

/// Outcomes of the abort step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbortOutcome {
    /// Migration deletions.
    pub aborts: Outcome,

    /// Pending-change conditions cleared after a requested abort. A conflict
    /// counts as success; the instance changed under us and is left alone.
    pub conditions: Outcome,
}

/// Delete every planned migration, concurrently.
pub async fn abort_migrations(ctx: ActionContext<'_>, plans: &[AbortPlan<'_>]) -> AbortOutcome {
    let results = join_all(plans.iter().map(|plan| abort_one(ctx, *plan))).await;
    AbortOutcome {
        aborts: Outcome::tally(results.iter().map(|(deleted, _)| *deleted)),
        conditions: Outcome::tally(results.iter().filter_map(|(_, cleared)| *cleared)),
    }
}

/// Whether the migration was deleted, and whether stale conditions were
/// cleared when that was attempted.
async fn abort_one(ctx: ActionContext<'_>, plan: AbortPlan<'_>) -> (bool, Option<bool>) {
    let AbortPlan {
        migration,
        instance,
        reason,
    } = plan;

    match ctx.orchestrator.delete_migration(&migration.key).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            debug!(migration = %migration.key, "Migration already deleted");
        }
        Err(e) => {
            ctx.metrics.record_failure();
            warn!(
                migration = %migration.key,
                instance = %instance.key,
                error = %e,
                "Failed to abort migration"
            );
            ctx.instance_event(
                EventReason::FailedChangeAbortion,
                &instance.key,
                format!("Failed to abort migration {}: {e}", migration.key.name()),
            )
            .await;
            return (false, None);
        }
    }

    ctx.metrics.record_abort();
    info!(
        migration = %migration.key,
        instance = %instance.key,
        reason = ?reason,
        "Aborted migration"
    );
    ctx.instance_event(
        EventReason::SuccessfulChangeAbortion,
        &instance.key,
        format!(
            "Aborted migration {} for the pending change",
            migration.key.name()
        ),
    )
    .await;

    if reason == AbortReason::Requested && instance.has_pending_change() {
        return (true, Some(clear_stale_conditions(ctx, instance).await));
    }
    (true, None)
}

async fn clear_stale_conditions(ctx: ActionContext<'_>, instance: &Instance) -> bool {
    let patch = match clear_pending_changes(instance) {
        Ok(patch) => patch,
        Err(e) => {
            ctx.metrics.record_failure();
            warn!(instance = %instance.key, error = %e, "Failed to build condition patch");
            return false;
        }
    };

    match ctx.orchestrator.patch_instance_status(&instance.key, &patch).await {
        Ok(()) => true,
        Err(e) if e.is_conflict() => {
            debug!(instance = %instance.key, "Conditions changed concurrently, leaving them");
            true
        }
        Err(e) => {
            ctx.metrics.record_failure();
            warn!(instance = %instance.key, error = %e, "Failed to clear pending-change conditions");
            false
        }
    }
}
