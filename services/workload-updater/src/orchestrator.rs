//! Orchestration API interface and in-process implementations.
//!
//! The orchestrator accepts the intents a pass produces:
//! - Creating and deleting live migrations
//! - Evicting the pod backing an instance
//! - Conditional status patches on the policy and on instances
//!
//! An in-memory implementation is provided for tests and a logging dry-run
//! implementation for running against a recorded fleet.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use vmroll_id::ObjectKey;
use vmroll_model::Migration;
use vmroll_reconcile::ConditionalPatch;

/// Errors returned by the orchestration API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// The object does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A conditional patch's test operation failed.
    #[error("conflict on {0}")]
    Conflict(String),

    /// The request was refused, e.g. by a disruption budget.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The API could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
}

impl OrchestratorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Orchestration API used by the updater.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Create a live migration.
    async fn create_migration(&self, migration: &Migration) -> Result<(), OrchestratorError>;

    /// Delete a live migration.
    async fn delete_migration(&self, migration: &ObjectKey) -> Result<(), OrchestratorError>;

    /// Evict a pod.
    async fn evict_pod(&self, pod: &ObjectKey) -> Result<(), OrchestratorError>;

    /// Apply a conditional JSON patch to the update policy's status.
    async fn patch_policy_status(
        &self,
        policy: &ObjectKey,
        patch: &ConditionalPatch,
    ) -> Result<(), OrchestratorError>;

    /// Apply a conditional JSON patch to an instance's status.
    async fn patch_instance_status(
        &self,
        instance: &ObjectKey,
        patch: &ConditionalPatch,
    ) -> Result<(), OrchestratorError>;
}

// =============================================================================
// In-memory orchestrator
// =============================================================================

/// Failures the in-memory orchestrator injects.
#[derive(Debug, Clone, Default)]
struct Faults {
    creates: bool,
    deletes: bool,
    evictions: bool,
    policy_conflict: bool,
    policy_patches: bool,
    instance_conflict: bool,
    instance_patches: bool,
    rejected_pods: HashSet<ObjectKey>,
    missing_migrations: HashSet<ObjectKey>,
}

#[derive(Debug, Default)]
struct Recorded {
    created: Vec<Migration>,
    deleted: Vec<ObjectKey>,
    evicted: Vec<ObjectKey>,
    policy_patches: Vec<(ObjectKey, ConditionalPatch)>,
    instance_patches: Vec<(ObjectKey, ConditionalPatch)>,
}

/// Orchestrator that records every accepted request.
///
/// Failures are scripted up front with the `failing_*` builders.
#[derive(Debug, Default)]
pub struct InMemoryOrchestrator {
    faults: Faults,
    recorded: Mutex<Recorded>,
}

impl InMemoryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every migration creation fails.
    pub fn failing_creates(mut self) -> Self {
        self.faults.creates = true;
        self
    }

    /// Every migration deletion fails.
    pub fn failing_deletes(mut self) -> Self {
        self.faults.deletes = true;
        self
    }

    /// Every eviction fails.
    pub fn failing_evictions(mut self) -> Self {
        self.faults.evictions = true;
        self
    }

    /// Evictions of this pod are refused.
    pub fn rejecting_pod(mut self, pod: ObjectKey) -> Self {
        self.faults.rejected_pods.insert(pod);
        self
    }

    /// Policy status patches fail their test operation.
    pub fn conflicting_policy_patches(mut self) -> Self {
        self.faults.policy_conflict = true;
        self
    }

    /// Policy status patches fail with a transport error.
    pub fn failing_policy_patches(mut self) -> Self {
        self.faults.policy_patches = true;
        self
    }

    /// Instance status patches fail their test operation.
    pub fn conflicting_instance_patches(mut self) -> Self {
        self.faults.instance_conflict = true;
        self
    }

    /// Instance status patches fail with a transport error.
    pub fn failing_instance_patches(mut self) -> Self {
        self.faults.instance_patches = true;
        self
    }

    /// Deleting this migration reports it as already gone.
    pub fn missing_migration(mut self, migration: ObjectKey) -> Self {
        self.faults.missing_migrations.insert(migration);
        self
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Migrations created so far.
    pub fn created_migrations(&self) -> Vec<Migration> {
        self.recorded().created.clone()
    }

    /// Migrations deleted so far.
    pub fn deleted_migrations(&self) -> Vec<ObjectKey> {
        self.recorded().deleted.clone()
    }

    /// Pods evicted so far.
    pub fn evicted_pods(&self) -> Vec<ObjectKey> {
        self.recorded().evicted.clone()
    }

    /// Policy status patches applied so far.
    pub fn policy_patches(&self) -> Vec<(ObjectKey, ConditionalPatch)> {
        self.recorded().policy_patches.clone()
    }

    /// Instance status patches applied so far.
    pub fn instance_patches(&self) -> Vec<(ObjectKey, ConditionalPatch)> {
        self.recorded().instance_patches.clone()
    }

    /// Forget everything recorded; scripted faults stay.
    pub fn reset(&self) {
        *self.recorded() = Recorded::default();
    }
}

#[async_trait]
impl Orchestrator for InMemoryOrchestrator {
    async fn create_migration(&self, migration: &Migration) -> Result<(), OrchestratorError> {
        if self.faults.creates {
            return Err(OrchestratorError::Transport(
                "migration create refused by test double".to_string(),
            ));
        }
        self.recorded().created.push(migration.clone());
        Ok(())
    }

    async fn delete_migration(&self, migration: &ObjectKey) -> Result<(), OrchestratorError> {
        if self.faults.missing_migrations.contains(migration) {
            return Err(OrchestratorError::NotFound(migration.to_string()));
        }
        if self.faults.deletes {
            return Err(OrchestratorError::Transport(
                "migration delete refused by test double".to_string(),
            ));
        }
        self.recorded().deleted.push(migration.clone());
        Ok(())
    }

    async fn evict_pod(&self, pod: &ObjectKey) -> Result<(), OrchestratorError> {
        if self.faults.rejected_pods.contains(pod) {
            return Err(OrchestratorError::Rejected(format!(
                "cannot evict {pod}: disruption budget exhausted"
            )));
        }
        if self.faults.evictions {
            return Err(OrchestratorError::Transport(
                "eviction refused by test double".to_string(),
            ));
        }
        self.recorded().evicted.push(pod.clone());
        Ok(())
    }

    async fn patch_policy_status(
        &self,
        policy: &ObjectKey,
        patch: &ConditionalPatch,
    ) -> Result<(), OrchestratorError> {
        if self.faults.policy_conflict {
            return Err(OrchestratorError::Conflict(policy.to_string()));
        }
        if self.faults.policy_patches {
            return Err(OrchestratorError::Transport(
                "policy patch refused by test double".to_string(),
            ));
        }
        self.recorded()
            .policy_patches
            .push((policy.clone(), patch.clone()));
        Ok(())
    }

    async fn patch_instance_status(
        &self,
        instance: &ObjectKey,
        patch: &ConditionalPatch,
    ) -> Result<(), OrchestratorError> {
        if self.faults.instance_conflict {
            return Err(OrchestratorError::Conflict(instance.to_string()));
        }
        if self.faults.instance_patches {
            return Err(OrchestratorError::Transport(
                "instance patch refused by test double".to_string(),
            ));
        }
        self.recorded()
            .instance_patches
            .push((instance.clone(), patch.clone()));
        Ok(())
    }
}

// =============================================================================
// Dry-run orchestrator
// =============================================================================

/// Orchestrator that only logs the intents it receives.
#[derive(Debug, Default)]
pub struct DryRunOrchestrator;

impl DryRunOrchestrator {
    pub fn new() -> Self {
        Self
    }
}

fn render(patch: &ConditionalPatch) -> String {
    patch
        .to_json()
        .unwrap_or_else(|e| format!("<unserializable patch: {e}>"))
}

#[async_trait]
impl Orchestrator for DryRunOrchestrator {
    async fn create_migration(&self, migration: &Migration) -> Result<(), OrchestratorError> {
        info!(
            migration = %migration.key,
            target = %migration.target,
            "[DRY RUN] Creating migration"
        );
        Ok(())
    }

    async fn delete_migration(&self, migration: &ObjectKey) -> Result<(), OrchestratorError> {
        info!(migration = %migration, "[DRY RUN] Deleting migration");
        Ok(())
    }

    async fn evict_pod(&self, pod: &ObjectKey) -> Result<(), OrchestratorError> {
        info!(pod = %pod, "[DRY RUN] Evicting pod");
        Ok(())
    }

    async fn patch_policy_status(
        &self,
        policy: &ObjectKey,
        patch: &ConditionalPatch,
    ) -> Result<(), OrchestratorError> {
        info!(policy = %policy, patch = %render(patch), "[DRY RUN] Patching policy status");
        Ok(())
    }

    async fn patch_instance_status(
        &self,
        instance: &ObjectKey,
        patch: &ConditionalPatch,
    ) -> Result<(), OrchestratorError> {
        info!(instance = %instance, patch = %render(patch), "[DRY RUN] Patching instance status");
        Ok(())
    }
}
