//! Event kinds and reason strings emitted by the workload updater.
//!
//! Reason strings are matched by log pipelines and alert rules, so their
//! exact spelling is part of the contract.

use serde::{Deserialize, Serialize};

// =============================================================================
// Reason Constants
// =============================================================================

/// All reason strings as constants.
pub mod reasons {
    // Migration dispatch
    pub const SUCCESSFUL_CREATE_MIGRATION: &str = "SuccessfulCreateMigration";
    pub const FAILED_CREATE_MIGRATION: &str = "FailedCreateMigration";

    // Eviction dispatch
    pub const SUCCESSFUL_EVICT_INSTANCE: &str = "SuccessfulEvictInstance";
    pub const FAILED_EVICT_INSTANCE: &str = "FailedEvictInstance";

    // Abort of self-triggered migrations
    pub const SUCCESSFUL_CHANGE_ABORTION: &str = "SuccessfulChangeAbortion";
    pub const FAILED_CHANGE_ABORTION: &str = "FailedChangeAbortion";
}

// =============================================================================
// Enums
// =============================================================================

/// Severity of an event, mirroring the orchestration API's event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Normal,
    Warning,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Normal => write!(f, "Normal"),
            EventKind::Warning => write!(f, "Warning"),
        }
    }
}

/// Typed form of the reason constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventReason {
    SuccessfulCreateMigration,
    FailedCreateMigration,
    SuccessfulEvictInstance,
    FailedEvictInstance,
    SuccessfulChangeAbortion,
    FailedChangeAbortion,
}

impl EventReason {
    /// All known reasons.
    pub const ALL: [EventReason; 6] = [
        EventReason::SuccessfulCreateMigration,
        EventReason::FailedCreateMigration,
        EventReason::SuccessfulEvictInstance,
        EventReason::FailedEvictInstance,
        EventReason::SuccessfulChangeAbortion,
        EventReason::FailedChangeAbortion,
    ];

    /// The wire spelling of this reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventReason::SuccessfulCreateMigration => reasons::SUCCESSFUL_CREATE_MIGRATION,
            EventReason::FailedCreateMigration => reasons::FAILED_CREATE_MIGRATION,
            EventReason::SuccessfulEvictInstance => reasons::SUCCESSFUL_EVICT_INSTANCE,
            EventReason::FailedEvictInstance => reasons::FAILED_EVICT_INSTANCE,
            EventReason::SuccessfulChangeAbortion => reasons::SUCCESSFUL_CHANGE_ABORTION,
            EventReason::FailedChangeAbortion => reasons::FAILED_CHANGE_ABORTION,
        }
    }

    /// The event kind that accompanies this reason.
    pub fn kind(&self) -> EventKind {
        match self {
            EventReason::SuccessfulCreateMigration
            | EventReason::SuccessfulEvictInstance
            | EventReason::SuccessfulChangeAbortion => EventKind::Normal,
            EventReason::FailedCreateMigration
            | EventReason::FailedEvictInstance
            | EventReason::FailedChangeAbortion => EventKind::Warning,
        }
    }
}

impl std::fmt::Display for EventReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_spelling_is_stable() {
        assert_eq!(
            EventReason::SuccessfulCreateMigration.as_str(),
            "SuccessfulCreateMigration"
        );
        assert_eq!(
            EventReason::SuccessfulEvictInstance.as_str(),
            "SuccessfulEvictInstance"
        );
        assert_eq!(
            EventReason::SuccessfulChangeAbortion.as_str(),
            "SuccessfulChangeAbortion"
        );
        assert_eq!(
            EventReason::FailedChangeAbortion.as_str(),
            "FailedChangeAbortion"
        );
    }

    #[test]
    fn test_failures_are_warnings() {
        for reason in EventReason::ALL {
            let is_failure = reason.as_str().starts_with("Failed");
            assert_eq!(reason.kind() == EventKind::Warning, is_failure);
        }
    }
}
