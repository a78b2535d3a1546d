//! Outdated-workload status reporting on the update policy.

use serde_json::json;
use tracing::{debug, warn};
use vmroll_model::UpdatePolicy;
use vmroll_reconcile::ConditionalPatch;

use crate::orchestrator::Orchestrator;

/// Pointer tokens of the outdated-workload count in the policy status.
pub const OUTDATED_WORKLOADS_PATH: &[&str] = &["status", "outdatedVirtualMachineInstanceWorkloads"];

/// Result of a status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    /// The recorded value already matched.
    Unchanged,
    /// The patch was applied.
    Patched,
    /// Someone else wrote the field first; the next pass will retry.
    Conflict,
    /// The patch could not be applied.
    Failed,
}

/// Test-then-replace patch moving the recorded count to `outdated`.
///
/// `None` when the recorded value already matches.
pub fn outdated_patch(policy: &UpdatePolicy, outdated: u32) -> Option<ConditionalPatch> {
    let recorded = policy.status.outdated_workloads;
    if recorded == Some(outdated) {
        return None;
    }
    Some(ConditionalPatch::new().set(
        OUTDATED_WORKLOADS_PATH,
        recorded.map(|v| json!(v)),
        json!(outdated),
    ))
}

/// Write the outdated count to the policy status when it changed.
pub async fn report_outdated(
    orchestrator: &dyn Orchestrator,
    policy: &UpdatePolicy,
    outdated: u32,
) -> StatusOutcome {
    let Some(patch) = outdated_patch(policy, outdated) else {
        return StatusOutcome::Unchanged;
    };

    match orchestrator.patch_policy_status(&policy.key, &patch).await {
        Ok(()) => {
            debug!(policy = %policy.key, outdated, "Updated outdated workload count");
            StatusOutcome::Patched
        }
        Err(e) if e.is_conflict() => {
            debug!(policy = %policy.key, "Policy status changed concurrently");
            StatusOutcome::Conflict
        }
        Err(e) => {
            warn!(policy = %policy.key, error = %e, "Failed to update outdated workload count");
            StatusOutcome::Failed
        }
    }
}
