//! # vmroll-id
//!
//! Object keys and generated identifiers for the vmroll workspace.
//!
//! ## Design Principles
//!
//! - Orchestrated objects are addressed by `namespace/name` (`ObjectKey`)
//! - Names minted by the controller are ULID-based and unique
//! - Every identifier has a canonical string form with strict parsing
//!
//! ## ID Format
//!
//! Generated identifiers use a prefixed format: `{prefix}-{ulid}`, lower case.
//!
//! Examples:
//! - `pass-01hv4z2wqxkjnm8gpqy6vbkc3d`
//! - `workload-update-01hv4z3mxnkpqr9hstz7wcld4e`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
