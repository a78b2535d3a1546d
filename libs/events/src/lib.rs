//! # vmroll-events
//!
//! Outcome notifications emitted by the workload updater.
//!
//! ## Design Principles
//!
//! - Every remote action the updater attempts produces exactly one event
//! - Failures are Warning events; successes are Normal events
//! - Reason strings are stable and matched verbatim by alerting
//!
//! ## Reasons
//!
//! - `SuccessfulCreateMigration` / `FailedCreateMigration`
//! - `SuccessfulEvictInstance` / `FailedEvictInstance`
//! - `SuccessfulChangeAbortion` / `FailedChangeAbortion`

mod envelope;
mod types;

pub use envelope::*;
pub use types::*;
