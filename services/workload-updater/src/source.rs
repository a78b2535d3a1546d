//! Fleet snapshot sources.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;
use vmroll_model::{FleetSnapshot, ModelError, SnapshotDocument};

/// Errors that can occur while loading a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid snapshot document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("inconsistent snapshot: {0}")]
    Model(#[from] ModelError),
}

/// Supplies a fresh snapshot for every pass.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn snapshot(&self) -> Result<FleetSnapshot, SnapshotError>;
}

/// Reads a JSON [`SnapshotDocument`] from disk on every pass.
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshotSource {
    async fn snapshot(&self) -> Result<FleetSnapshot, SnapshotError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SnapshotError::Io {
                path: self.path.clone(),
                source,
            })?;
        let document: SnapshotDocument = serde_json::from_slice(&bytes)?;
        Ok(FleetSnapshot::try_from(document)?)
    }
}

/// Serves whatever snapshot was last stored, for tests.
///
/// Clones share the stored snapshot, so a test can keep a handle and change
/// the fleet under a running worker.
#[derive(Debug, Clone, Default)]
pub struct StaticSnapshotSource {
    snapshot: Arc<Mutex<FleetSnapshot>>,
}

impl StaticSnapshotSource {
    pub fn new(snapshot: FleetSnapshot) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(snapshot)),
        }
    }

    fn current(&self) -> MutexGuard<'_, FleetSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the snapshot served to subsequent passes.
    pub fn replace(&self, snapshot: FleetSnapshot) {
        *self.current() = snapshot;
    }
}

#[async_trait]
impl SnapshotSource for StaticSnapshotSource {
    async fn snapshot(&self) -> Result<FleetSnapshot, SnapshotError> {
        Ok(self.current().clone())
    }
}
