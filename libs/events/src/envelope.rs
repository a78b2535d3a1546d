//! Event record - the common shape of every outcome notification.
//!
//! Every event the updater emits is about an instance, including aborts of
//! the migrations that target one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vmroll_id::{ObjectKey, PassId};

use crate::{EventKind, EventReason};

/// An outcome notification attached to one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,

    /// Normal or Warning.
    pub kind: EventKind,

    /// Machine-readable reason.
    pub reason: EventReason,

    /// Instance the event is about.
    pub instance: ObjectKey,

    /// Human-readable message.
    pub message: String,

    /// Reconciliation pass that produced the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_id: Option<PassId>,
}

impl EventRecord {
    /// Create a record stamped now. The kind follows from the reason.
    pub fn new(reason: EventReason, instance: ObjectKey, message: impl Into<String>) -> Self {
        Self {
            occurred_at: Utc::now(),
            kind: reason.kind(),
            reason,
            instance,
            message: message.into(),
            pass_id: None,
        }
    }

    /// Attach the pass that produced this event.
    pub fn with_pass(mut self, pass_id: PassId) -> Self {
        self.pass_id = Some(pass_id);
        self
    }

    /// Returns true for Warning events.
    pub fn is_warning(&self) -> bool {
        self.kind == EventKind::Warning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind_follows_reason() {
        let ok = EventRecord::new(
            EventReason::SuccessfulEvictInstance,
            ObjectKey::new("default", "testvm"),
            "evicted",
        );
        assert_eq!(ok.kind, EventKind::Normal);
        assert!(!ok.is_warning());

        let failed = EventRecord::new(
            EventReason::FailedEvictInstance,
            ObjectKey::new("default", "testvm"),
            "eviction refused",
        );
        assert!(failed.is_warning());
    }

    #[test]
    fn test_record_serialization() {
        let pass_id = PassId::new();
        let record = EventRecord::new(
            EventReason::SuccessfulCreateMigration,
            ObjectKey::new("default", "testvm"),
            "created migration",
        )
        .with_pass(pass_id);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["reason"], "SuccessfulCreateMigration");
        assert_eq!(json["kind"], "Normal");
        assert_eq!(json["instance"], "default/testvm");
        assert_eq!(json["pass_id"], pass_id.to_string());

        let parsed: EventRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_pass_id_omitted_when_absent() {
        let record = EventRecord::new(
            EventReason::FailedChangeAbortion,
            ObjectKey::new("default", "testvm"),
            "delete failed",
        );
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("pass_id").is_none());
    }
}
