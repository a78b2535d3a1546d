//! Shared plumbing for issuing remote actions within a pass.

use vmroll_events::{EventReason, EventRecord};
use vmroll_id::{ObjectKey, PassId};

use crate::metrics::UpdaterMetrics;
use crate::orchestrator::Orchestrator;
use crate::recorder::EventRecorder;

/// Capabilities borrowed by every action issued in one pass.
#[derive(Clone, Copy)]
pub struct ActionContext<'a> {
    pub orchestrator: &'a dyn Orchestrator,
    pub recorder: &'a dyn EventRecorder,
    pub metrics: &'a UpdaterMetrics,
    pub pass_id: PassId,
}

impl ActionContext<'_> {
    /// Record an event about an instance, tagged with this pass.
    pub async fn instance_event(&self, reason: EventReason, instance: &ObjectKey, message: String) {
        let event = EventRecord::new(reason, instance.clone(), message)
            .with_pass(self.pass_id);
        self.recorder.record(event).await;
    }
}

/// Success and failure counts of one batch of actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    pub succeeded: usize,
    pub failed: usize,
}

impl Outcome {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    pub(crate) fn tally(results: impl IntoIterator<Item = bool>) -> Self {
        results.into_iter().fold(Self::default(), |mut acc, ok| {
            if ok {
                acc.succeeded += 1;
            } else {
                acc.failed += 1;
            }
            acc
        })
    }
}

/// Per-target results of one batch of actions.
#[derive(Debug, Clone)]
pub struct Dispatched<T> {
    pub accepted: Vec<T>,
    pub failed: Vec<T>,
}

impl<T> Dispatched<T> {
    pub fn outcome(&self) -> Outcome {
        Outcome {
            succeeded: self.accepted.len(),
            failed: self.failed.len(),
        }
    }

    pub(crate) fn collect(results: impl IntoIterator<Item = Result<T, T>>) -> Self {
        let (mut accepted, mut failed) = (Vec::new(), Vec::new());
        for result in results {
            match result {
                Ok(target) => accepted.push(target),
                Err(target) => failed.push(target),
            }
        }
        Self { accepted, failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatched_outcome() {
        let dispatched = Dispatched::collect([Ok("a"), Err("b"), Ok("c")]);
        assert_eq!(dispatched.accepted, vec!["a", "c"]);
        assert_eq!(dispatched.failed, vec!["b"]);
        assert_eq!(
            dispatched.outcome(),
            Outcome {
                succeeded: 2,
                failed: 1
            }
        );
        assert_eq!(dispatched.outcome().attempted(), 3);
    }
}
