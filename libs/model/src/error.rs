//! Error types for snapshot assembly.

use thiserror::Error;
use vmroll_id::ObjectKey;

/// Errors that can occur when assembling a fleet snapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Two objects of the same kind share a key.
    #[error("duplicate {kind} {key}")]
    DuplicateObject { kind: &'static str, key: String },
}

impl ModelError {
    pub(crate) fn duplicate(kind: &'static str, key: &ObjectKey) -> Self {
        ModelError::DuplicateObject {
            kind,
            key: key.to_string(),
        }
    }
}
