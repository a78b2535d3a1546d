//! Error types for the workload updater.

use thiserror::Error;
use vmroll_id::{ObjectKey, PassId};

use crate::source::SnapshotError;

/// Errors surfaced to the worker loop.
#[derive(Debug, Error)]
pub enum UpdaterError {
    /// The fleet snapshot could not be loaded.
    #[error("failed to load fleet snapshot: {0}")]
    Snapshot(#[from] SnapshotError),

    /// A pass completed but some of its remote actions failed.
    #[error("pass {pass_id} for {policy} finished with {failures} failed action(s)")]
    PassFailed {
        pass_id: PassId,
        policy: ObjectKey,
        failures: usize,
    },
}
