//! Fleet fixtures shared by vmroll tests.
//!
//! Instances built here are live, carry one active launcher pod on
//! [`NODE`], and come in two flavours: migratable (live-migratable condition
//! true) and non-migratable.

use vmroll_id::ObjectKey;
use vmroll_model::{
    ConditionType, FleetSnapshot, Instance, Migration, MigrationPhase, Pod, UpdateMethod,
    UpdatePolicy,
};

/// Namespace test workloads live in.
pub const NAMESPACE: &str = "default";

/// Namespace and name of the update policy.
pub const POLICY_NAMESPACE: &str = "kubevirt";
pub const POLICY_NAME: &str = "kubevirt";

/// Version the fleet is being rolled to.
pub const TARGET_VERSION: &str = "registry.local/virt-launcher:v1.1.0";

/// Version outdated instances run.
pub const OLD_VERSION: &str = "registry.local/virt-launcher:v1.0.0";

/// Node every fixture instance runs on.
pub const NODE: &str = "node01";

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NAMESPACE, name)
}

pub fn policy_key() -> ObjectKey {
    ObjectKey::new(POLICY_NAMESPACE, POLICY_NAME)
}

/// A deployed update policy with the given methods enabled.
pub fn policy(methods: &[UpdateMethod]) -> UpdatePolicy {
    UpdatePolicy::new(policy_key()).with_methods(methods.iter().copied())
}

/// A live instance running `version`, with one active pod.
pub fn instance(name: &str, version: &str, migratable: bool) -> Instance {
    Instance::running(key(name), format!("uid-{name}"))
        .with_launcher_version(version)
        .with_condition(ConditionType::LiveMigratable, migratable)
        .with_active_pod(format!("pod-{name}"), NODE)
}

pub fn outdated_migratable(name: &str) -> Instance {
    instance(name, OLD_VERSION, true)
}

pub fn outdated_non_migratable(name: &str) -> Instance {
    instance(name, OLD_VERSION, false)
}

pub fn current(name: &str) -> Instance {
    instance(name, TARGET_VERSION, true)
}

/// A migration for `target` in the given phase.
pub fn migration(name: &str, target: &str, phase: MigrationPhase) -> Migration {
    Migration::new(key(name), target, phase)
}

/// A migration created by the workload updater.
pub fn self_triggered(name: &str, target: &str, phase: MigrationPhase) -> Migration {
    migration(name, target, phase).as_self_triggered()
}

/// Launcher pods backing an instance's active pod entries.
pub fn launcher_pods(instance: &Instance) -> Vec<Pod> {
    instance
        .active_pods
        .iter()
        .enumerate()
        .map(|(i, (pod_uid, node))| {
            let name = match i {
                0 => format!("virt-launcher-{}", instance.key.name()),
                _ => format!("virt-launcher-{}-{i}", instance.key.name()),
            };
            Pod::new(instance.key.sibling(name), pod_uid.clone(), instance.uid.clone())
                .on_node(node.clone())
        })
        .collect()
}

/// Assembles a [`FleetSnapshot`] from fixtures.
#[derive(Debug, Clone, Default)]
pub struct FleetBuilder {
    policy: Option<UpdatePolicy>,
    instances: Vec<Instance>,
    migrations: Vec<Migration>,
    pods: Vec<Pod>,
}

impl FleetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy(mut self, policy: UpdatePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Add an instance together with its launcher pods.
    pub fn instance(mut self, instance: Instance) -> Self {
        self.pods.extend(launcher_pods(&instance));
        self.instances.push(instance);
        self
    }

    /// Add an instance whose pods are not in the snapshot.
    pub fn instance_without_pods(mut self, instance: Instance) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn instances(self, instances: impl IntoIterator<Item = Instance>) -> Self {
        instances
            .into_iter()
            .fold(self, |builder, instance| builder.instance(instance))
    }

    /// `count` outdated migratable instances named `{prefix}-{i}`.
    pub fn outdated_migratable(self, prefix: &str, count: usize) -> Self {
        self.instances((0..count).map(|i| outdated_migratable(&format!("{prefix}-{i}"))))
    }

    /// `count` outdated non-migratable instances named `{prefix}-{i}`.
    pub fn outdated_non_migratable(self, prefix: &str, count: usize) -> Self {
        self.instances((0..count).map(|i| outdated_non_migratable(&format!("{prefix}-{i}"))))
    }

    pub fn migration(mut self, migration: Migration) -> Self {
        self.migrations.push(migration);
        self
    }

    pub fn migrations(mut self, migrations: impl IntoIterator<Item = Migration>) -> Self {
        self.migrations.extend(migrations);
        self
    }

    pub fn build(self) -> FleetSnapshot {
        FleetSnapshot::from_parts(self.policy, self.instances, self.migrations, self.pods)
            .expect("fixture keys are unique")
    }
}
