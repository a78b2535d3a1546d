//! Migration dispatch for outdated, migratable instances.

use futures_util::future::join_all;
use tracing::{debug, info, warn};
use vmroll_events::EventReason;
use vmroll_id::MigrationName;
use vmroll_model::{FleetSnapshot, Instance, Migration, MigrationPhase};
use vmroll_reconcile::MigrationSlots;

use crate::classifier::Classification;
use crate::dispatch::{ActionContext, Dispatched};
use crate::pending::PendingActions;

/// Pick the instances to migrate this pass, consuming one slot each.
///
/// Instances already targeted by an unfinished migration, migrating
/// according to their own status, or covered by an action an earlier pass
/// issued are skipped without consuming a slot.
pub fn select_candidates<'a>(
    classification: &Classification<'a>,
    snapshot: &FleetSnapshot,
    pending: &PendingActions,
    slots: &mut MigrationSlots,
) -> Vec<&'a Instance> {
    let mut selected = Vec::new();
    for instance in classification.migratable.iter().copied() {
        if instance.migrating || snapshot.has_unfinished_migration(&instance.key) {
            debug!(instance = %instance.key, "Migration already in flight");
            continue;
        }
        if pending.covers(&instance.key) {
            debug!(instance = %instance.key, "Action from an earlier pass not yet observed");
            continue;
        }
        if !slots.try_take() {
            break;
        }
        selected.push(instance);
    }
    selected
}

/// The self-triggered migration that moves `instance`.
pub fn migration_for(instance: &Instance) -> Migration {
    let name = MigrationName::new();
    Migration::new(
        instance.key.sibling(name.to_string()),
        instance.key.name(),
        MigrationPhase::Pending,
    )
    .as_self_triggered()
}

/// Create one migration per candidate, concurrently.
pub async fn create_migrations(
    ctx: ActionContext<'_>,
    candidates: &[&Instance],
) -> Dispatched<Migration> {
    let results = join_all(
        candidates
            .iter()
            .map(|instance| create_migration(ctx, instance)),
    )
    .await;
    Dispatched::collect(results)
}

async fn create_migration(
    ctx: ActionContext<'_>,
    instance: &Instance,
) -> Result<Migration, Migration> {
    let migration = migration_for(instance);

    match ctx.orchestrator.create_migration(&migration).await {
        Ok(()) => {
            ctx.metrics.record_migration_created();
            info!(
                instance = %instance.key,
                migration = %migration.key,
                "Created migration"
            );
            ctx.instance_event(
                EventReason::SuccessfulCreateMigration,
                &instance.key,
                format!(
                    "Created migration {} for automated workload update",
                    migration.key.name()
                ),
            )
            .await;
            Ok(migration)
        }
        Err(e) => {
            ctx.metrics.record_failure();
            warn!(instance = %instance.key, error = %e, "Failed to create migration");
            ctx.instance_event(
                EventReason::FailedCreateMigration,
                &instance.key,
                format!("Failed to create migration for automated workload update: {e}"),
            )
            .await;
            Err(migration)
        }
    }
}
