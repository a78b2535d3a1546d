//! Read-only projections of the orchestrated objects the updater looks at.
//!
//! These carry only the fields the rollout decisions depend on. They are
//! owned by the orchestration system; the updater never mutates them and
//! only issues intents against them.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vmroll_id::ObjectKey;

/// Default number of evictions issued per batch.
pub const DEFAULT_BATCH_EVICTION_SIZE: u32 = 10;

/// Default minimum interval between eviction batches.
pub const DEFAULT_BATCH_EVICTION_INTERVAL: Duration = Duration::ZERO;

// =============================================================================
// Instances
// =============================================================================

/// Lifecycle phase of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum InstancePhase {
    #[default]
    Pending,
    Scheduling,
    Scheduled,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl InstancePhase {
    /// Returns true once the instance can never run again.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Condition types the updater reads from an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Ready,
    LiveMigratable,
    /// Memory resize requested on a running instance.
    MemoryChange,
    /// vCPU hotplug requested on a running instance.
    CpuChange,
    /// Some other in-place change needs a migration to take effect.
    MigrationRequired,
}

impl ConditionType {
    /// Returns true for conditions that request an in-place change which only
    /// a migration can apply.
    pub fn is_pending_change(&self) -> bool {
        matches!(
            self,
            Self::MemoryChange | Self::CpuChange | Self::MigrationRequired
        )
    }
}

/// A boolean condition on an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: bool,
}

impl Condition {
    pub fn new(type_: ConditionType, status: bool) -> Self {
        Self { type_, status }
    }
}

/// Projection of a virtual machine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub key: ObjectKey,

    pub uid: String,

    #[serde(default)]
    pub phase: InstancePhase,

    /// Runtime version the instance was launched with. `None` until reported.
    #[serde(default)]
    pub launcher_version: Option<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Set when an operator asked for any self-triggered migration of this
    /// instance to be cancelled.
    #[serde(default)]
    pub abort_requested: bool,

    /// Active backing pods: pod uid to node name.
    #[serde(default)]
    pub active_pods: BTreeMap<String, String>,

    /// Node the instance currently runs on.
    #[serde(default)]
    pub node: Option<String>,

    /// Deletion has been requested.
    #[serde(default)]
    pub deleting: bool,

    /// A live migration is in progress according to the instance itself.
    #[serde(default)]
    pub migrating: bool,
}

impl Instance {
    /// A running instance with no conditions and no reported version.
    pub fn running(key: ObjectKey, uid: impl Into<String>) -> Self {
        Self {
            key,
            uid: uid.into(),
            phase: InstancePhase::Running,
            launcher_version: None,
            conditions: Vec::new(),
            abort_requested: false,
            active_pods: BTreeMap::new(),
            node: None,
            deleting: false,
            migrating: false,
        }
    }

    pub fn with_launcher_version(mut self, version: impl Into<String>) -> Self {
        self.launcher_version = Some(version.into());
        self
    }

    /// Set (or replace) a condition.
    pub fn with_condition(mut self, type_: ConditionType, status: bool) -> Self {
        self.conditions.retain(|c| c.type_ != type_);
        self.conditions.push(Condition::new(type_, status));
        self
    }

    pub fn with_abort_requested(mut self) -> Self {
        self.abort_requested = true;
        self
    }

    /// Record an active pod on a node; also places the instance on that node.
    pub fn with_active_pod(mut self, pod_uid: impl Into<String>, node: impl Into<String>) -> Self {
        let node = node.into();
        self.active_pods.insert(pod_uid.into(), node.clone());
        self.node = Some(node);
        self
    }

    /// Status of a condition, `None` when the condition is absent.
    pub fn condition(&self, type_: ConditionType) -> Option<bool> {
        self.conditions
            .iter()
            .find(|c| c.type_ == type_)
            .map(|c| c.status)
    }

    /// Returns true when the live-migratable condition is true.
    pub fn is_migratable(&self) -> bool {
        self.condition(ConditionType::LiveMigratable) == Some(true)
    }

    /// Pending-change conditions that are currently true.
    pub fn pending_changes(&self) -> impl Iterator<Item = ConditionType> + '_ {
        self.conditions
            .iter()
            .filter(|c| c.status && c.type_.is_pending_change())
            .map(|c| c.type_)
    }

    pub fn has_pending_change(&self) -> bool {
        self.pending_changes().next().is_some()
    }

    /// Running and not being deleted.
    pub fn is_live(&self) -> bool {
        self.phase == InstancePhase::Running && !self.deleting
    }
}

// =============================================================================
// Migrations
// =============================================================================

/// Migration phase. `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MigrationPhase {
    #[default]
    Pending,
    Scheduling,
    Running,
    Succeeded,
    Failed,
}

impl MigrationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Projection of a live-migration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub key: ObjectKey,

    /// Name of the target instance, in the migration's namespace.
    pub target: String,

    #[serde(default)]
    pub phase: MigrationPhase,

    /// Created by the workload updater rather than by a user.
    #[serde(default)]
    pub self_triggered: bool,
}

impl Migration {
    pub fn new(key: ObjectKey, target: impl Into<String>, phase: MigrationPhase) -> Self {
        Self {
            key,
            target: target.into(),
            phase,
            self_triggered: false,
        }
    }

    pub fn as_self_triggered(mut self) -> Self {
        self.self_triggered = true;
        self
    }

    /// Key of the instance this migration moves.
    pub fn target_key(&self) -> ObjectKey {
        self.key.sibling(self.target.clone())
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

// =============================================================================
// Pods
// =============================================================================

/// Pod phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

/// Projection of the pod backing an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub key: ObjectKey,

    pub uid: String,

    #[serde(default)]
    pub node: Option<String>,

    #[serde(default)]
    pub phase: PodPhase,

    /// Uid of the instance this pod was created for.
    pub owner_uid: String,
}

impl Pod {
    pub fn new(key: ObjectKey, uid: impl Into<String>, owner_uid: impl Into<String>) -> Self {
        Self {
            key,
            uid: uid.into(),
            node: None,
            phase: PodPhase::Running,
            owner_uid: owner_uid.into(),
        }
    }

    pub fn on_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }
}

// =============================================================================
// Update policy
// =============================================================================

/// How outdated instances may be updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UpdateMethod {
    LiveMigrate,
    Evict,
}

/// Deployment phase of the component that owns the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PolicyPhase {
    #[default]
    Deploying,
    Deployed,
    Deleting,
}

/// Status block of the update policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PolicyStatus {
    #[serde(default)]
    pub phase: PolicyPhase,

    #[serde(default)]
    pub observed_deployment_id: Option<String>,

    #[serde(default)]
    pub target_deployment_id: Option<String>,

    /// Outdated-instance count last written by the updater.
    #[serde(default)]
    pub outdated_workloads: Option<u32>,
}

/// Cluster-wide policy describing how the fleet is rolled to a new version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePolicy {
    pub key: ObjectKey,

    #[serde(default)]
    pub methods: BTreeSet<UpdateMethod>,

    #[serde(default)]
    pub batch_eviction_size: Option<u32>,

    #[serde(default, with = "crate::millis")]
    pub batch_eviction_interval: Option<Duration>,

    #[serde(default)]
    pub status: PolicyStatus,
}

impl UpdatePolicy {
    /// A deployed policy with no methods enabled.
    pub fn new(key: ObjectKey) -> Self {
        Self {
            key,
            methods: BTreeSet::new(),
            batch_eviction_size: None,
            batch_eviction_interval: None,
            status: PolicyStatus {
                phase: PolicyPhase::Deployed,
                ..Default::default()
            },
        }
    }

    pub fn with_methods(mut self, methods: impl IntoIterator<Item = UpdateMethod>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn with_batch_eviction_size(mut self, size: u32) -> Self {
        self.batch_eviction_size = Some(size);
        self
    }

    pub fn with_batch_eviction_interval(mut self, interval: Duration) -> Self {
        self.batch_eviction_interval = Some(interval);
        self
    }

    pub fn with_outdated_workloads(mut self, count: u32) -> Self {
        self.status.outdated_workloads = Some(count);
        self
    }

    pub fn allows(&self, method: UpdateMethod) -> bool {
        self.methods.contains(&method)
    }

    pub fn batch_eviction_size(&self) -> u32 {
        self.batch_eviction_size.unwrap_or(DEFAULT_BATCH_EVICTION_SIZE)
    }

    pub fn batch_eviction_interval(&self) -> Duration {
        self.batch_eviction_interval
            .unwrap_or(DEFAULT_BATCH_EVICTION_INTERVAL)
    }

    /// The owning component has finished its own deployment; workload updates
    /// must not start while it is still rolling out.
    pub fn is_deployed(&self) -> bool {
        self.status.phase == PolicyPhase::Deployed
            && self.status.observed_deployment_id == self.status.target_deployment_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new("default", name)
    }

    #[test]
    fn test_pending_change_conditions() {
        assert!(ConditionType::MemoryChange.is_pending_change());
        assert!(ConditionType::CpuChange.is_pending_change());
        assert!(ConditionType::MigrationRequired.is_pending_change());
        assert!(!ConditionType::LiveMigratable.is_pending_change());
        assert!(!ConditionType::Ready.is_pending_change());
    }

    #[test]
    fn test_false_pending_change_is_not_pending() {
        let vmi = Instance::running(key("testvm"), "uid-1")
            .with_condition(ConditionType::MemoryChange, false);
        assert!(!vmi.has_pending_change());

        let vmi = vmi.with_condition(ConditionType::MemoryChange, true);
        assert!(vmi.has_pending_change());
        assert_eq!(
            vmi.pending_changes().collect::<Vec<_>>(),
            vec![ConditionType::MemoryChange]
        );
    }

    #[test]
    fn test_with_condition_replaces() {
        let vmi = Instance::running(key("testvm"), "uid-1")
            .with_condition(ConditionType::LiveMigratable, false)
            .with_condition(ConditionType::LiveMigratable, true);
        assert_eq!(vmi.conditions.len(), 1);
        assert!(vmi.is_migratable());
    }

    #[test]
    fn test_is_live() {
        let mut vmi = Instance::running(key("testvm"), "uid-1");
        assert!(vmi.is_live());

        vmi.deleting = true;
        assert!(!vmi.is_live());

        vmi.deleting = false;
        vmi.phase = InstancePhase::Succeeded;
        assert!(!vmi.is_live());

        vmi.phase = InstancePhase::Scheduled;
        assert!(!vmi.is_live());
    }

    #[test]
    fn test_migration_terminal_phases() {
        assert!(!MigrationPhase::Pending.is_terminal());
        assert!(!MigrationPhase::Scheduling.is_terminal());
        assert!(!MigrationPhase::Running.is_terminal());
        assert!(MigrationPhase::Succeeded.is_terminal());
        assert!(MigrationPhase::Failed.is_terminal());
    }

    #[test]
    fn test_migration_target_key() {
        let mig = Migration::new(key("vmim-1"), "testvm", MigrationPhase::Running);
        assert_eq!(mig.target_key(), key("testvm"));
    }

    #[test]
    fn test_policy_defaults() {
        let policy = UpdatePolicy::new(key("kv"));
        assert_eq!(policy.batch_eviction_size(), DEFAULT_BATCH_EVICTION_SIZE);
        assert_eq!(policy.batch_eviction_interval(), Duration::ZERO);
        assert!(!policy.allows(UpdateMethod::Evict));
        assert!(policy.is_deployed());
    }

    #[test]
    fn test_policy_not_deployed_while_rolling() {
        let mut policy = UpdatePolicy::new(key("kv"));
        policy.status.target_deployment_id = Some("new".to_string());
        policy.status.observed_deployment_id = Some("old".to_string());
        assert!(!policy.is_deployed());

        policy.status.observed_deployment_id = Some("new".to_string());
        assert!(policy.is_deployed());

        policy.status.phase = PolicyPhase::Deploying;
        assert!(!policy.is_deployed());
    }

    #[test]
    fn test_policy_json() {
        let json = serde_json::json!({
            "key": "kubevirt/kubevirt",
            "methods": ["LiveMigrate", "Evict"],
            "batch_eviction_size": 5,
            "batch_eviction_interval": 2000,
            "status": { "phase": "Deployed", "outdated_workloads": 3 }
        });
        let policy: UpdatePolicy = serde_json::from_value(json).unwrap();
        assert!(policy.allows(UpdateMethod::LiveMigrate));
        assert!(policy.allows(UpdateMethod::Evict));
        assert_eq!(policy.batch_eviction_size(), 5);
        assert_eq!(policy.batch_eviction_interval(), Duration::from_secs(2));
        assert_eq!(policy.status.outdated_workloads, Some(3));
    }
}
