//! Eviction dispatch for outdated instances that cannot be migrated.

use futures_util::future::join_all;
use tracing::{debug, info, warn};
use vmroll_events::EventReason;
use vmroll_model::{FleetSnapshot, Instance, Pod};

use crate::classifier::Classification;
use crate::dispatch::{ActionContext, Dispatched};
use crate::pending::PendingActions;

/// An instance and the pod whose eviction restarts it.
#[derive(Debug, Clone, Copy)]
pub struct EvictionTarget<'a> {
    pub instance: &'a Instance,
    pub pod: &'a Pod,
}

/// Outdated instances that should be restarted by eviction.
///
/// Non-migratable instances always qualify; migratable ones only when live
/// migration is disabled. Instances with a migration in flight are excluded.
pub fn eligible<'a>(
    classification: &Classification<'a>,
    snapshot: &FleetSnapshot,
    live_migrate_enabled: bool,
) -> Vec<&'a Instance> {
    classification
        .outdated()
        .filter(|instance| !live_migrate_enabled || !instance.is_migratable())
        .filter(|instance| !instance.migrating && !snapshot.has_unfinished_migration(&instance.key))
        .collect()
}

/// Resolve pods for up to `budget` eligible instances, in order.
///
/// Instances an earlier pass already evicted are skipped. Instances whose
/// last eviction was refused go after all others, so a pod that keeps being
/// refused cannot hold the head of the queue. Instances without a
/// resolvable active pod are skipped and do not consume budget.
pub fn select_batch<'a>(
    eligible: &[&'a Instance],
    snapshot: &'a FleetSnapshot,
    pending: &PendingActions,
    budget: usize,
) -> Vec<EvictionTarget<'a>> {
    let (refused, fresh): (Vec<&Instance>, Vec<&Instance>) = eligible
        .iter()
        .copied()
        .filter(|instance| !pending.covers(&instance.key))
        .partition(|instance| pending.was_refused(&instance.key));

    let mut batch = Vec::with_capacity(budget.min(eligible.len()));
    for instance in fresh.into_iter().chain(refused) {
        if batch.len() >= budget {
            break;
        }
        match snapshot.active_pod(instance) {
            Some(pod) => batch.push(EvictionTarget { instance, pod }),
            None => debug!(instance = %instance.key, "No active pod to evict"),
        }
    }
    batch
}

/// Evict every target's pod, concurrently.
pub async fn evict<'a>(
    ctx: ActionContext<'_>,
    batch: &[EvictionTarget<'a>],
) -> Dispatched<EvictionTarget<'a>> {
    let results = join_all(batch.iter().map(|target| evict_one(ctx, *target))).await;
    Dispatched::collect(results)
}

async fn evict_one<'a>(
    ctx: ActionContext<'_>,
    target: EvictionTarget<'a>,
) -> Result<EvictionTarget<'a>, EvictionTarget<'a>> {
    let EvictionTarget { instance, pod } = target;

    match ctx.orchestrator.evict_pod(&pod.key).await {
        Ok(()) => {
            ctx.metrics.record_eviction();
            info!(instance = %instance.key, pod = %pod.key, "Evicted instance");
            ctx.instance_event(
                EventReason::SuccessfulEvictInstance,
                &instance.key,
                format!(
                    "Evicted pod {} for automated workload update",
                    pod.key.name()
                ),
            )
            .await;
            Ok(target)
        }
        Err(e) => {
            ctx.metrics.record_failure();
            warn!(instance = %instance.key, pod = %pod.key, error = %e, "Failed to evict instance");
            ctx.instance_event(
                EventReason::FailedEvictInstance,
                &instance.key,
                format!("Failed to evict pod {}: {e}", pod.key.name()),
            )
            .await;
            Err(target)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use std::time::{Duration, Instant};
    use vmroll_model::MigrationPhase;
    use vmroll_testing::{
        key, migration, outdated_migratable, outdated_non_migratable, FleetBuilder,
        TARGET_VERSION,
    };

    fn idle() -> PendingActions {
        PendingActions::new(Duration::from_secs(300))
    }

    fn names(batch: &[EvictionTarget<'_>]) -> Vec<String> {
        batch
            .iter()
            .map(|target| target.instance.key.name().to_string())
            .collect()
    }

    #[test]
    fn test_migratable_only_when_live_migrate_disabled() {
        let snapshot = FleetBuilder::new()
            .instance(outdated_migratable("a"))
            .instance(outdated_non_migratable("b"))
            .build();
        let classification = classify(&snapshot, TARGET_VERSION);

        let with_migrate = eligible(&classification, &snapshot, true);
        assert_eq!(with_migrate.len(), 1);
        assert_eq!(with_migrate[0].key.name(), "b");

        let without_migrate = eligible(&classification, &snapshot, false);
        let names: Vec<_> = without_migrate.iter().map(|i| i.key.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_in_flight_migration_blocks_eviction() {
        let snapshot = FleetBuilder::new()
            .instance(outdated_non_migratable("a"))
            .instance(outdated_non_migratable("b"))
            .migration(migration("vmim-1", "a", MigrationPhase::Scheduling))
            .build();
        let classification = classify(&snapshot, TARGET_VERSION);

        let candidates = eligible(&classification, &snapshot, false);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].key.name(), "b");
    }

    #[test]
    fn test_missing_pod_does_not_consume_budget() {
        let snapshot = FleetBuilder::new()
            .instance_without_pods(outdated_non_migratable("a"))
            .instance(outdated_non_migratable("b"))
            .instance(outdated_non_migratable("c"))
            .build();
        let classification = classify(&snapshot, TARGET_VERSION);
        let candidates = eligible(&classification, &snapshot, true);

        let batch = select_batch(&candidates, &snapshot, &idle(), 1);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].instance.key.name(), "b");
        assert_eq!(batch[0].pod.key.name(), "virt-launcher-b");
    }

    #[test]
    fn test_zero_budget_selects_nothing() {
        let snapshot = FleetBuilder::new()
            .outdated_non_migratable("vm", 3)
            .build();
        let classification = classify(&snapshot, TARGET_VERSION);
        let candidates = eligible(&classification, &snapshot, true);
        assert!(select_batch(&candidates, &snapshot, &idle(), 0).is_empty());
    }

    #[test]
    fn test_refused_instances_go_last() {
        let snapshot = FleetBuilder::new()
            .outdated_non_migratable("vm", 4)
            .build();
        let classification = classify(&snapshot, TARGET_VERSION);
        let candidates = eligible(&classification, &snapshot, true);

        let mut pending = idle();
        pending.eviction_refused(key("vm-0"));
        pending.evicted(key("vm-1"), "pod-vm-1".to_string(), Instant::now());

        let batch = select_batch(&candidates, &snapshot, &pending, 3);
        assert_eq!(names(&batch), vec!["vm-2", "vm-3", "vm-0"]);

        let batch = select_batch(&candidates, &snapshot, &pending, 1);
        assert_eq!(names(&batch), vec!["vm-2"]);
    }
}
