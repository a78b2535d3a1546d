//! Per-policy memory of actions earlier passes issued.
//!
//! The snapshot can lag the orchestration API by a pass or more. Without this
//! memory a pass would see no migration for an instance it just migrated and
//! create another one, or evict a pod that is already on its way out.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tracing::debug;
use vmroll_id::ObjectKey;
use vmroll_model::{FleetSnapshot, Instance};
use vmroll_reconcile::Expectations;

/// Actions issued for one policy that the snapshot does not reflect yet.
#[derive(Debug, Clone)]
pub struct PendingActions {
    /// Instance to the migration created for it.
    migrations: Expectations<ObjectKey, ObjectKey>,

    /// Instance to the uid of the pod evicted for it.
    evictions: Expectations<ObjectKey, String>,

    /// Instances whose last eviction attempt was refused.
    refused: BTreeSet<ObjectKey>,
}

impl PendingActions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            migrations: Expectations::new(ttl),
            evictions: Expectations::new(ttl),
            refused: BTreeSet::new(),
        }
    }

    /// Forget actions `snapshot` reflects, and those older than the ttl.
    ///
    /// A migration is reflected once the snapshot lists it, in any phase. An
    /// eviction is reflected once the instance is deleting or its evicted pod
    /// is gone. Either is settled when the instance itself is gone.
    pub fn settle(&mut self, snapshot: &FleetSnapshot, now: Instant) {
        let migrations = self.migrations.settle(now, |instance, migration| {
            snapshot.migration(migration).is_some() || !is_live(snapshot, instance)
        });
        let evictions = self.evictions.settle(now, |instance, pod_uid| {
            snapshot.instance(instance).is_none_or(|i| {
                !i.is_live() || snapshot.pods_owned_by(&i.uid).all(|pod| pod.uid != *pod_uid)
            })
        });
        self.refused.retain(|instance| is_live(snapshot, instance));

        if migrations + evictions > 0 {
            debug!(migrations, evictions, "Actions not yet reflected in snapshot");
        }
    }

    /// Migrations created by earlier passes that the snapshot does not list.
    pub fn unobserved_migrations(&self) -> usize {
        self.migrations.count()
    }

    /// True when an earlier pass already migrated or evicted the instance.
    pub fn covers(&self, instance: &ObjectKey) -> bool {
        self.migrations.is_pending(instance) || self.evictions.is_pending(instance)
    }

    /// True when the instance's last eviction attempt was refused.
    pub fn was_refused(&self, instance: &ObjectKey) -> bool {
        self.refused.contains(instance)
    }

    pub fn migration_created(&mut self, instance: ObjectKey, migration: ObjectKey, now: Instant) {
        self.migrations.expect(instance, migration, now);
    }

    pub fn evicted(&mut self, instance: ObjectKey, pod_uid: String, now: Instant) {
        self.refused.remove(&instance);
        self.evictions.expect(instance, pod_uid, now);
    }

    pub fn eviction_refused(&mut self, instance: ObjectKey) {
        self.refused.insert(instance);
    }
}

fn is_live(snapshot: &FleetSnapshot, instance: &ObjectKey) -> bool {
    snapshot.instance(instance).is_some_and(Instance::is_live)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmroll_model::MigrationPhase;
    use vmroll_testing::{
        key, outdated_migratable, outdated_non_migratable, self_triggered, FleetBuilder,
    };

    const TTL: Duration = Duration::from_secs(300);

    #[test]
    fn test_migration_settles_once_listed() {
        let t0 = Instant::now();
        let mut pending = PendingActions::new(TTL);
        pending.migration_created(key("vm"), key("workload-update-1"), t0);

        let lagging = FleetBuilder::new().instance(outdated_migratable("vm")).build();
        pending.settle(&lagging, t0);
        assert!(pending.covers(&key("vm")));
        assert_eq!(pending.unobserved_migrations(), 1);

        let caught_up = FleetBuilder::new()
            .instance(outdated_migratable("vm"))
            .migration(self_triggered("workload-update-1", "vm", MigrationPhase::Succeeded))
            .build();
        pending.settle(&caught_up, t0);
        assert_eq!(pending.unobserved_migrations(), 0);
        assert!(!pending.covers(&key("vm")));
    }

    #[test]
    fn test_eviction_settles_when_pod_gone() {
        let t0 = Instant::now();
        let mut pending = PendingActions::new(TTL);
        pending.evicted(key("vm"), "pod-vm".to_string(), t0);

        let with_pod = FleetBuilder::new().instance(outdated_non_migratable("vm")).build();
        pending.settle(&with_pod, t0);
        assert!(pending.covers(&key("vm")));

        let without_pod = FleetBuilder::new()
            .instance_without_pods(outdated_non_migratable("vm"))
            .build();
        pending.settle(&without_pod, t0);
        assert!(!pending.covers(&key("vm")));
    }

    #[test]
    fn test_eviction_settles_when_instance_deleting() {
        let t0 = Instant::now();
        let mut pending = PendingActions::new(TTL);
        pending.evicted(key("vm"), "pod-vm".to_string(), t0);

        let mut deleting = outdated_non_migratable("vm");
        deleting.deleting = true;
        pending.settle(&FleetBuilder::new().instance(deleting).build(), t0);
        assert!(!pending.covers(&key("vm")));
    }

    #[test]
    fn test_unobserved_actions_expire() {
        let t0 = Instant::now();
        let mut pending = PendingActions::new(TTL);
        pending.migration_created(key("vm"), key("workload-update-1"), t0);
        let fleet = FleetBuilder::new()
            .instance(outdated_migratable("vm"))
            .build();

        pending.settle(&fleet, t0 + TTL - Duration::from_secs(1));
        assert!(pending.covers(&key("vm")));
        pending.settle(&fleet, t0 + TTL);
        assert!(!pending.covers(&key("vm")));
    }

    #[test]
    fn test_refusal_cleared_by_eviction_and_by_departure() {
        let t0 = Instant::now();
        let mut pending = PendingActions::new(TTL);
        pending.eviction_refused(key("a"));
        pending.eviction_refused(key("b"));

        pending.evicted(key("a"), "pod-a".to_string(), t0);
        assert!(!pending.was_refused(&key("a")));

        pending.settle(&FleetBuilder::new().build(), t0);
        assert!(!pending.was_refused(&key("b")));
    }
}
