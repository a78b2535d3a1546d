//! # vmroll-model
//!
//! Projections of the objects a workload rollout reads: instances, their
//! backing pods, live migrations and the cluster-wide update policy, plus the
//! indexed `FleetSnapshot` handed to each reconciliation pass.
//!
//! Everything here is read-only input. The orchestration system owns these
//! objects; the updater observes them through a snapshot and acts only by
//! issuing intents.

mod error;
pub(crate) mod millis;
mod resources;
mod snapshot;

pub use error::ModelError;
pub use resources::*;
pub use snapshot::{FleetSnapshot, SnapshotDocument};
