//! Event recording.
//!
//! Events are fire-and-forget: a recorder never returns an error, and a lost
//! event never fails a pass.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{info, warn};
use vmroll_events::{EventReason, EventRecord};

/// Sink for outcome notifications.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Record an event about an instance.
    async fn record(&self, event: EventRecord);
}

/// Recorder that writes events to the log.
#[derive(Debug, Default)]
pub struct TracingRecorder;

#[async_trait]
impl EventRecorder for TracingRecorder {
    async fn record(&self, event: EventRecord) {
        let pass_id = event.pass_id.map(|id| id.to_string()).unwrap_or_default();
        if event.is_warning() {
            warn!(
                reason = event.reason.as_str(),
                instance = %event.instance,
                pass_id = %pass_id,
                "{}",
                event.message
            );
        } else {
            info!(
                reason = event.reason.as_str(),
                instance = %event.instance,
                pass_id = %pass_id,
                "{}",
                event.message
            );
        }
    }
}

/// Recorder that keeps events in memory, for tests.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<EventRecord>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn events_mut(&self) -> MutexGuard<'_, Vec<EventRecord>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All recorded events, oldest first.
    pub fn events(&self) -> Vec<EventRecord> {
        self.events_mut().clone()
    }

    /// Reasons of all recorded events, oldest first.
    pub fn reasons(&self) -> Vec<EventReason> {
        self.events_mut().iter().map(|e| e.reason).collect()
    }

    /// Number of events with the given reason.
    pub fn count(&self, reason: EventReason) -> usize {
        self.events_mut().iter().filter(|e| e.reason == reason).count()
    }

    pub fn is_empty(&self) -> bool {
        self.events_mut().is_empty()
    }

    /// Drain recorded events.
    pub fn take(&self) -> Vec<EventRecord> {
        std::mem::take(&mut *self.events_mut())
    }
}

#[async_trait]
impl EventRecorder for MemoryRecorder {
    async fn record(&self, event: EventRecord) {
        self.events_mut().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmroll_id::ObjectKey;

    fn event(reason: EventReason) -> EventRecord {
        EventRecord::new(reason, ObjectKey::new("default", "testvm"), "test")
    }

    #[test]
    fn recorders_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MemoryRecorder>();
        assert_send_sync::<TracingRecorder>();
    }

    #[tokio::test]
    async fn test_memory_recorder_counts_and_drains() {
        let recorder = MemoryRecorder::new();
        recorder.record(event(EventReason::SuccessfulEvictInstance)).await;
        recorder.record(event(EventReason::SuccessfulEvictInstance)).await;
        recorder.record(event(EventReason::FailedEvictInstance)).await;

        assert_eq!(recorder.count(EventReason::SuccessfulEvictInstance), 2);
        assert_eq!(recorder.count(EventReason::FailedEvictInstance), 1);
        assert_eq!(recorder.take().len(), 3);
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_tracing_recorder_does_not_panic() {
        TracingRecorder.record(event(EventReason::FailedCreateMigration)).await;
    }
}
