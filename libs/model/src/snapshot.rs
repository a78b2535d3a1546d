//! Indexed, read-only view of the fleet handed to each reconciliation pass.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use vmroll_id::ObjectKey;

use crate::{Instance, Migration, ModelError, Pod, UpdatePolicy};

/// Serializable form of a snapshot, as produced by a cache dump.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub policy: Option<UpdatePolicy>,

    #[serde(default)]
    pub instances: Vec<Instance>,

    #[serde(default)]
    pub migrations: Vec<Migration>,

    #[serde(default)]
    pub pods: Vec<Pod>,
}

/// Point-in-time view of instances, migrations, pods and the update policy.
///
/// Collections are keyed by `namespace/name` and iterate in that order.
/// Secondary indexes are built once when the snapshot is assembled.
#[derive(Debug, Clone, Default)]
pub struct FleetSnapshot {
    policy: Option<UpdatePolicy>,
    instances: BTreeMap<ObjectKey, Instance>,
    migrations: BTreeMap<ObjectKey, Migration>,
    pods: BTreeMap<ObjectKey, Pod>,

    by_namespace: BTreeMap<String, Vec<ObjectKey>>,
    by_node: BTreeMap<String, Vec<ObjectKey>>,
    unfinished_by_target: BTreeMap<ObjectKey, Vec<ObjectKey>>,
    pods_by_owner: HashMap<String, Vec<ObjectKey>>,
}

impl FleetSnapshot {
    /// Assemble a snapshot, rejecting duplicate keys.
    pub fn from_parts(
        policy: Option<UpdatePolicy>,
        instances: impl IntoIterator<Item = Instance>,
        migrations: impl IntoIterator<Item = Migration>,
        pods: impl IntoIterator<Item = Pod>,
    ) -> Result<Self, ModelError> {
        let mut snapshot = Self {
            policy,
            ..Default::default()
        };

        for instance in instances {
            if snapshot.instances.contains_key(&instance.key) {
                return Err(ModelError::duplicate("instance", &instance.key));
            }
            snapshot
                .by_namespace
                .entry(instance.key.namespace().to_string())
                .or_default()
                .push(instance.key.clone());
            if let Some(node) = &instance.node {
                snapshot
                    .by_node
                    .entry(node.clone())
                    .or_default()
                    .push(instance.key.clone());
            }
            snapshot.instances.insert(instance.key.clone(), instance);
        }

        for migration in migrations {
            if snapshot.migrations.contains_key(&migration.key) {
                return Err(ModelError::duplicate("migration", &migration.key));
            }
            if !migration.is_terminal() {
                snapshot
                    .unfinished_by_target
                    .entry(migration.target_key())
                    .or_default()
                    .push(migration.key.clone());
            }
            snapshot.migrations.insert(migration.key.clone(), migration);
        }

        for pod in pods {
            if snapshot.pods.contains_key(&pod.key) {
                return Err(ModelError::duplicate("pod", &pod.key));
            }
            snapshot
                .pods_by_owner
                .entry(pod.owner_uid.clone())
                .or_default()
                .push(pod.key.clone());
            snapshot.pods.insert(pod.key.clone(), pod);
        }

        for keys in snapshot.by_namespace.values_mut() {
            keys.sort();
        }
        for keys in snapshot.by_node.values_mut() {
            keys.sort();
        }

        Ok(snapshot)
    }

    pub fn policy(&self) -> Option<&UpdatePolicy> {
        self.policy.as_ref()
    }

    /// All instances in `(namespace, name)` order.
    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    pub fn instance(&self, key: &ObjectKey) -> Option<&Instance> {
        self.instances.get(key)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn instances_in_namespace<'a>(
        &'a self,
        namespace: &str,
    ) -> impl Iterator<Item = &'a Instance> + 'a {
        self.lookup(self.by_namespace.get(namespace))
    }

    pub fn instances_on_node<'a>(&'a self, node: &str) -> impl Iterator<Item = &'a Instance> + 'a {
        self.lookup(self.by_node.get(node))
    }

    fn lookup<'a>(
        &'a self,
        keys: Option<&'a Vec<ObjectKey>>,
    ) -> impl Iterator<Item = &'a Instance> + 'a {
        keys.into_iter()
            .flatten()
            .filter_map(|key| self.instances.get(key))
    }

    /// All migrations in key order, terminal ones included.
    pub fn migrations(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.values()
    }

    pub fn migration(&self, key: &ObjectKey) -> Option<&Migration> {
        self.migrations.get(key)
    }

    /// Migrations that have not reached a terminal phase.
    pub fn unfinished_migrations(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.values().filter(|m| !m.is_terminal())
    }

    /// Number of non-terminal migrations across the whole cluster.
    pub fn unfinished_migration_count(&self) -> usize {
        self.unfinished_migrations().count()
    }

    /// True if any non-terminal migration targets the instance.
    pub fn has_unfinished_migration(&self, instance: &ObjectKey) -> bool {
        self.unfinished_by_target
            .get(instance)
            .is_some_and(|keys| !keys.is_empty())
    }

    /// All pods in key order.
    pub fn pods(&self) -> impl Iterator<Item = &Pod> {
        self.pods.values()
    }

    /// Pods created for the given instance uid.
    pub fn pods_owned_by<'a>(&'a self, owner_uid: &str) -> impl Iterator<Item = &'a Pod> + 'a {
        self.pods_by_owner
            .get(owner_uid)
            .into_iter()
            .flatten()
            .filter_map(|key| self.pods.get(key))
    }

    /// The pod currently backing an instance.
    ///
    /// Only pods the instance lists as active are considered. When several
    /// are active, the one on the instance's current node wins.
    pub fn active_pod(&self, instance: &Instance) -> Option<&Pod> {
        let mut active = self
            .pods_owned_by(&instance.uid)
            .filter(|pod| instance.active_pods.contains_key(&pod.uid));

        let first = active.next()?;
        if first.node.is_some() && first.node == instance.node {
            return Some(first);
        }
        Some(
            active
                .find(|pod| pod.node.is_some() && pod.node == instance.node)
                .unwrap_or(first),
        )
    }
}

impl TryFrom<SnapshotDocument> for FleetSnapshot {
    type Error = ModelError;

    fn try_from(doc: SnapshotDocument) -> Result<Self, Self::Error> {
        Self::from_parts(doc.policy, doc.instances, doc.migrations, doc.pods)
    }
}
