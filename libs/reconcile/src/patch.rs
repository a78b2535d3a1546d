//! Conditional JSON patches.
//!
//! A conditional patch asserts the current value at a path before replacing
//! it, so a concurrent writer causes the whole patch to be rejected instead
//! of being silently overwritten.

use json_patch::{AddOperation, PatchOperation, ReplaceOperation, TestOperation};
use jsonptr::PointerBuf;
use serde_json::Value;

/// Test-then-write patch for one or more paths.
///
/// Paths are given as pointer tokens, e.g. `&["status", "conditions"]`.
/// Paths whose previous value is known get a `test` guard followed by a
/// `replace`. Paths that were never set are written with `add`.
#[derive(Debug, Clone, Default)]
pub struct ConditionalPatch {
    operations: Vec<PatchOperation>,
}

fn pointer(path: &[&str]) -> PointerBuf {
    PointerBuf::from_tokens(path.iter().copied())
}

impl ConditionalPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` at `path`, guarded by the value observed earlier.
    pub fn set(mut self, path: &[&str], observed: Option<Value>, value: Value) -> Self {
        let path = pointer(path);
        match observed {
            Some(observed) => {
                self.operations.push(PatchOperation::Test(TestOperation {
                    path: path.clone(),
                    value: observed,
                }));
                self.operations
                    .push(PatchOperation::Replace(ReplaceOperation { path, value }));
            }
            None => self
                .operations
                .push(PatchOperation::Add(AddOperation { path, value })),
        }
        self
    }

    pub fn operations(&self) -> &[PatchOperation] {
        &self.operations
    }

    /// Serialize as a JSON patch document.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.operations)
    }
}
