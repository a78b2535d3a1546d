//! Workload updater configuration.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use vmroll_reconcile::{DEFAULT_EXPECTATION_TTL, DEFAULT_RECONCILE_INTERVAL};

use crate::updater::{UpdaterConfig, DEFAULT_PARALLEL_MIGRATIONS};

/// Default period between passes.
pub const DEFAULT_RESYNC_INTERVAL_MS: u64 = DEFAULT_RECONCILE_INTERVAL.as_millis() as u64;

/// Shortest accepted period between passes.
pub const MIN_RESYNC_INTERVAL_MS: u64 = 100;

/// Workload updater configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Launcher version instances should run.
    pub target_version: String,

    /// Cluster-wide cap on unfinished migrations.
    pub parallel_migrations: u32,

    /// Period between passes.
    pub resync_interval: Duration,

    /// How long an issued action may be missing from snapshots before it
    /// may be issued again.
    pub expectation_ttl: Duration,

    /// JSON fleet snapshot read on every pass.
    pub snapshot_file: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Run one pass, then exit.
    pub once: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let target_version = lookup("VMROLL_TARGET_VERSION")
            .filter(|v| !v.trim().is_empty())
            .context("Missing target version. Set VMROLL_TARGET_VERSION.")?;

        let parallel_migrations: u32 = lookup("VMROLL_PARALLEL_MIGRATIONS")
            .map(|v| v.parse())
            .transpose()
            .context("VMROLL_PARALLEL_MIGRATIONS must be a non-negative integer.")?
            .unwrap_or(DEFAULT_PARALLEL_MIGRATIONS);

        let resync_interval_ms: u64 = lookup("VMROLL_RESYNC_INTERVAL_MS")
            .map(|v| v.parse())
            .transpose()
            .context("VMROLL_RESYNC_INTERVAL_MS must be an integer (milliseconds).")?
            .unwrap_or(DEFAULT_RESYNC_INTERVAL_MS);
        let resync_interval = Duration::from_millis(resync_interval_ms.max(MIN_RESYNC_INTERVAL_MS));

        let expectation_ttl = lookup("VMROLL_EXPECTATION_TTL_MS")
            .map(|v| v.parse().map(Duration::from_millis))
            .transpose()
            .context("VMROLL_EXPECTATION_TTL_MS must be an integer (milliseconds).")?
            .unwrap_or(DEFAULT_EXPECTATION_TTL);

        let snapshot_file = lookup("VMROLL_SNAPSHOT_FILE")
            .map(PathBuf::from)
            .context("Missing snapshot file. Set VMROLL_SNAPSHOT_FILE.")?;

        let log_level = lookup("VMROLL_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let once = lookup("VMROLL_ONCE")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            target_version,
            parallel_migrations,
            resync_interval,
            expectation_ttl,
            snapshot_file,
            log_level,
            once,
        })
    }

    /// Settings for the reconciliation pass.
    pub fn updater_config(&self) -> UpdaterConfig {
        UpdaterConfig::new(self.target_version.clone())
            .with_parallel_migrations(self.parallel_migrations)
            .with_expectation_ttl(self.expectation_ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[
            ("VMROLL_TARGET_VERSION", "v2"),
            ("VMROLL_SNAPSHOT_FILE", "/tmp/fleet.json"),
        ])
        .unwrap();

        assert_eq!(config.target_version, "v2");
        assert_eq!(config.parallel_migrations, DEFAULT_PARALLEL_MIGRATIONS);
        assert_eq!(config.resync_interval, Duration::from_secs(30));
        assert_eq!(config.expectation_ttl, DEFAULT_EXPECTATION_TTL);
        assert_eq!(config.log_level, "info");
        assert!(!config.once);
        assert_eq!(config.updater_config().target_version, "v2");
    }

    #[test]
    fn test_overrides_and_clamp() {
        let config = load(&[
            ("VMROLL_TARGET_VERSION", "v2"),
            ("VMROLL_SNAPSHOT_FILE", "/tmp/fleet.json"),
            ("VMROLL_PARALLEL_MIGRATIONS", "12"),
            ("VMROLL_RESYNC_INTERVAL_MS", "5"),
            ("VMROLL_EXPECTATION_TTL_MS", "60000"),
            ("VMROLL_ONCE", "TRUE"),
        ])
        .unwrap();

        assert_eq!(config.parallel_migrations, 12);
        assert_eq!(config.resync_interval, Duration::from_millis(MIN_RESYNC_INTERVAL_MS));
        assert_eq!(
            config.updater_config().expectation_ttl,
            Duration::from_secs(60)
        );
        assert!(config.once);
    }

    #[test]
    fn test_missing_target_version() {
        let err = load(&[("VMROLL_SNAPSHOT_FILE", "/tmp/fleet.json")]).unwrap_err();
        assert!(err.to_string().contains("VMROLL_TARGET_VERSION"));

        let err = load(&[
            ("VMROLL_TARGET_VERSION", "  "),
            ("VMROLL_SNAPSHOT_FILE", "/tmp/fleet.json"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("VMROLL_TARGET_VERSION"));
    }

    #[test]
    fn test_invalid_number() {
        let err = load(&[
            ("VMROLL_TARGET_VERSION", "v2"),
            ("VMROLL_SNAPSHOT_FILE", "/tmp/fleet.json"),
            ("VMROLL_PARALLEL_MIGRATIONS", "-1"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("VMROLL_PARALLEL_MIGRATIONS"));
    }
}
