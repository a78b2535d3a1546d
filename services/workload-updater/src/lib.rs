//! vmroll Workload Updater Library
//!
//! Rolls a fleet of long-lived virtual-machine instances to a new launcher
//! version without exceeding the cluster's disruption budget.
//!
//! ## Architecture
//!
//! ```text
//! UpdaterWorker          (interval loop, retry backoff)
//! └── WorkloadUpdater    (one pass per snapshot)
//!     ├── classifier     (outdated / migratable)
//!     ├── status         (outdated count on the policy)
//!     ├── abort          (cancel self-triggered migrations)
//!     ├── migration      (create migrations under the global cap)
//!     └── eviction       (evict pods in rate-limited batches)
//! ```
//!
//! ## Modules
//!
//! - `orchestrator`: Orchestration API interface, in-memory and dry-run implementations
//! - `pending`: Actions issued by earlier passes that snapshots do not show yet
//! - `recorder`: Event sinks
//! - `source`: Snapshot sources
//! - `metrics`: Process-wide counters and the outdated gauge

pub mod abort;
pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod eviction;
pub mod metrics;
pub mod migration;
pub mod orchestrator;
pub mod pending;
pub mod recorder;
pub mod source;
pub mod status;
pub mod updater;
pub mod worker;

pub use error::UpdaterError;
pub use metrics::{MetricsSnapshot, UpdaterMetrics};
pub use orchestrator::{DryRunOrchestrator, InMemoryOrchestrator, Orchestrator, OrchestratorError};
pub use pending::PendingActions;
pub use recorder::{EventRecorder, MemoryRecorder, TracingRecorder};
pub use source::{FileSnapshotSource, SnapshotError, SnapshotSource, StaticSnapshotSource};
pub use updater::{PassReport, SkipReason, UpdaterConfig, WorkloadUpdater};
pub use worker::UpdaterWorker;
