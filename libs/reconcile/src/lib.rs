//! Admission primitives for rate-limited rollouts.
//!
//! This library provides the bookkeeping a rollout pass needs to stay inside
//! its disruption budget. Key concepts:
//!
//! - **Migration slots**: how many more live migrations may start, given the
//!   cluster-wide cap and the migrations already in flight.
//! - **Eviction gate**: how many evictions the next batch may carry, and
//!   whether the minimum interval since the previous batch has elapsed.
//! - **Expectations**: actions issued by an earlier pass that the snapshot
//!   has not caught up with yet. They keep a lagging snapshot from causing
//!   the same action twice.
//! - **Retry backoff**: how long to wait before re-running a pass that left
//!   failures behind.
//!
//! # Invariants
//!
//! - Slots handed out in one pass plus those already in flight never exceed
//!   the cap
//! - A batch is granted only after the interval has elapsed since the last
//!   batch that actually carried an eviction
//! - All decisions are deterministic given the same inputs and clock

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

mod patch;

pub use json_patch::PatchOperation;
pub use patch::ConditionalPatch;

/// Migration slots available to a single pass.
///
/// Computed once from the in-flight count observed in the snapshot and then
/// consumed in memory; the snapshot is not re-read mid-pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSlots {
    limit: usize,
    in_flight: usize,
    taken: usize,
}

impl MigrationSlots {
    /// Reserve the slots left under `limit` with `in_flight` migrations running.
    pub fn reserve(limit: u32, in_flight: usize) -> Self {
        Self {
            limit: limit as usize,
            in_flight,
            taken: 0,
        }
    }

    /// Slots still available in this pass.
    pub fn available(&self) -> usize {
        self.limit.saturating_sub(self.in_flight + self.taken)
    }

    /// Slots consumed so far in this pass.
    pub fn taken(&self) -> usize {
        self.taken
    }

    /// Consume one slot. Returns false when none are left.
    pub fn try_take(&mut self) -> bool {
        if self.available() == 0 {
            return false;
        }
        self.taken += 1;
        true
    }
}

/// Evictions granted to one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionBudget {
    granted: usize,
    at: Instant,
}

impl EvictionBudget {
    /// Number of evictions this batch may issue.
    pub fn granted(&self) -> usize {
        self.granted
    }

    pub fn is_empty(&self) -> bool {
        self.granted == 0
    }
}

/// Batch-interval gate for evictions.
///
/// Holds only the time of the last batch that carried at least one eviction.
/// The state lives for the lifetime of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionGate {
    last_batch: Option<Instant>,
}

impl EvictionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time of the last committed batch.
    pub fn last_batch(&self) -> Option<Instant> {
        self.last_batch
    }

    /// Budget for a batch starting at `now`.
    ///
    /// Zero while `now - last_batch < interval`, otherwise `batch_size`.
    pub fn reserve(&self, now: Instant, interval: Duration, batch_size: u32) -> EvictionBudget {
        let open = match self.last_batch {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= interval,
        };

        EvictionBudget {
            granted: if open { batch_size as usize } else { 0 },
            at: now,
        }
    }

    /// Record the outcome of a batch. The interval clock only advances when
    /// at least one eviction was attempted.
    pub fn commit(&mut self, budget: EvictionBudget, attempted: usize) {
        if attempted > 0 {
            self.last_batch = Some(budget.at);
        }
    }
}

/// Actions issued by earlier passes that the snapshot does not show yet.
///
/// Each entry maps a key to what was done for it. An entry is dropped once
/// the caller observes the action in a snapshot, or once it is older than
/// the ttl, so a lost action is eventually retried.
#[derive(Debug, Clone)]
pub struct Expectations<K, V> {
    ttl: Duration,
    pending: BTreeMap<K, (V, Instant)>,
}

impl<K: Ord, V> Expectations<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: BTreeMap::new(),
        }
    }

    /// Record that `value` was issued for `key` at `now`.
    pub fn expect(&mut self, key: K, value: V, now: Instant) {
        self.pending.insert(key, (value, now));
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    /// Number of unobserved expectations.
    pub fn count(&self) -> usize {
        self.pending.len()
    }

    /// Drop expectations that `observed` confirms or that outlived the ttl.
    ///
    /// Returns the number still pending.
    pub fn settle(&mut self, now: Instant, mut observed: impl FnMut(&K, &V) -> bool) -> usize {
        let ttl = self.ttl;
        self.pending.retain(|key, (value, at)| {
            now.saturating_duration_since(*at) < ttl && !observed(key, value)
        });
        self.pending.len()
    }
}

/// Exponential retry backoff per resource key.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    /// Delay after the first failure.
    base: Duration,

    /// Upper bound on any delay.
    max: Duration,

    /// Consecutive failures per resource key.
    failures: BTreeMap<String, u32>,
}

impl RetryBackoff {
    /// Create a new backoff tracker.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: BTreeMap::new(),
        }
    }

    /// Record a failure for a resource.
    ///
    /// Returns the delay before the resource should be retried.
    pub fn record_failure(&mut self, resource_key: &str) -> Duration {
        let count = self.failures.entry(resource_key.to_string()).or_insert(0);
        *count += 1;
        let factor = 1u32.checked_shl(count.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Consecutive failures recorded for a resource.
    pub fn failures(&self, resource_key: &str) -> u32 {
        self.failures.get(resource_key).copied().unwrap_or(0)
    }

    /// Clear failure tracking for a resource (on success).
    pub fn clear(&mut self, resource_key: &str) {
        self.failures.remove(resource_key);
    }
}

/// Default interval between reconciliation passes.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Default lifetime of an unobserved expectation.
pub const DEFAULT_EXPECTATION_TTL: Duration = Duration::from_secs(5 * 60);

/// Default delay after the first failed pass.
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(1);

/// Default upper bound on the retry delay.
pub const DEFAULT_RETRY_MAX: Duration = Duration::from_secs(5 * 60);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_migration_slots() {
        let mut slots = MigrationSlots::reserve(5, 4);
        assert_eq!(slots.available(), 1);
        assert!(slots.try_take());
        assert!(!slots.try_take());
        assert_eq!(slots.taken(), 1);
    }

    #[test]
    fn test_migration_slots_over_limit() {
        // More in flight than the cap allows (cap lowered at runtime)
        let mut slots = MigrationSlots::reserve(2, 7);
        assert_eq!(slots.available(), 0);
        assert!(!slots.try_take());
    }

    #[test]
    fn test_eviction_gate_first_batch_open() {
        let gate = EvictionGate::new();
        let budget = gate.reserve(Instant::now(), Duration::from_secs(60), 10);
        assert_eq!(budget.granted(), 10);
    }

    #[test]
    fn test_eviction_gate_interval() {
        let mut gate = EvictionGate::new();
        let t0 = Instant::now();
        let interval = Duration::from_secs(2);

        let budget = gate.reserve(t0, interval, 5);
        assert_eq!(budget.granted(), 5);
        gate.commit(budget, 5);
        assert_eq!(gate.last_batch(), Some(t0));

        // Immediately after: closed
        let budget = gate.reserve(t0 + Duration::from_millis(10), interval, 5);
        assert!(budget.is_empty());

        // Exactly at the interval: open
        let budget = gate.reserve(t0 + interval, interval, 5);
        assert_eq!(budget.granted(), 5);
    }

    #[test]
    fn test_eviction_gate_empty_batch_does_not_advance() {
        let mut gate = EvictionGate::new();
        let t0 = Instant::now();
        let interval = Duration::from_secs(60);

        let budget = gate.reserve(t0, interval, 5);
        gate.commit(budget, 0);
        assert_eq!(gate.last_batch(), None);

        let budget = gate.reserve(t0 + Duration::from_secs(1), interval, 5);
        assert_eq!(budget.granted(), 5);
    }

    #[test]
    fn test_eviction_gate_zero_interval_always_open() {
        let mut gate = EvictionGate::new();
        let t0 = Instant::now();
        let budget = gate.reserve(t0, Duration::ZERO, 3);
        gate.commit(budget, 3);
        assert_eq!(gate.reserve(t0, Duration::ZERO, 3).granted(), 3);
    }

    #[test]
    fn test_expectations_settle_when_observed() {
        let mut expectations = Expectations::new(Duration::from_secs(60));
        let t0 = Instant::now();
        expectations.expect("default/a", "workload-update-1", t0);
        expectations.expect("default/b", "workload-update-2", t0);
        assert!(expectations.is_pending(&"default/a"));
        assert_eq!(expectations.count(), 2);

        // Only the first action shows up in the next snapshot
        let left = expectations.settle(t0, |_, migration| *migration == "workload-update-1");
        assert_eq!(left, 1);
        assert!(!expectations.is_pending(&"default/a"));
        assert!(expectations.is_pending(&"default/b"));
    }

    #[test]
    fn test_expectations_expire() {
        let ttl = Duration::from_secs(60);
        let mut expectations = Expectations::new(ttl);
        let t0 = Instant::now();
        expectations.expect("default/a", (), t0);

        assert_eq!(expectations.settle(t0 + Duration::from_secs(59), |_, _| false), 1);
        assert_eq!(expectations.settle(t0 + ttl, |_, _| false), 0);
        assert!(!expectations.is_pending(&"default/a"));
    }

    #[test]
    fn test_expectations_reissue_restarts_clock() {
        let ttl = Duration::from_secs(60);
        let mut expectations = Expectations::new(ttl);
        let t0 = Instant::now();
        expectations.expect("default/a", 1, t0);
        expectations.expect("default/a", 2, t0 + Duration::from_secs(30));

        assert_eq!(expectations.count(), 1);
        assert_eq!(expectations.settle(t0 + ttl, |_, value| *value == 1), 1);
    }

    #[test]
    fn test_retry_backoff() {
        let mut backoff = RetryBackoff::new(Duration::from_secs(1), Duration::from_secs(5));

        assert_eq!(backoff.failures("kubevirt/kubevirt"), 0);
        assert_eq!(backoff.record_failure("kubevirt/kubevirt"), Duration::from_secs(1));
        assert_eq!(backoff.record_failure("kubevirt/kubevirt"), Duration::from_secs(2));
        assert_eq!(backoff.record_failure("kubevirt/kubevirt"), Duration::from_secs(4));
        // Capped
        assert_eq!(backoff.record_failure("kubevirt/kubevirt"), Duration::from_secs(5));
        assert_eq!(backoff.failures("kubevirt/kubevirt"), 4);
        assert_eq!(backoff.failures("other/policy"), 0);

        backoff.clear("kubevirt/kubevirt");
        assert_eq!(backoff.failures("kubevirt/kubevirt"), 0);
        assert_eq!(backoff.record_failure("kubevirt/kubevirt"), Duration::from_secs(1));
    }

    #[test]
    fn test_retry_backoff_many_failures_saturate() {
        let mut backoff = RetryBackoff::new(Duration::from_secs(1), Duration::from_secs(300));
        let mut last = Duration::ZERO;
        for _ in 0..64 {
            last = backoff.record_failure("k");
        }
        assert_eq!(last, Duration::from_secs(300));
    }

    proptest! {
        #[test]
        fn prop_slots_never_exceed_limit(limit in 0u32..64, in_flight in 0usize..128, attempts in 0usize..128) {
            let mut slots = MigrationSlots::reserve(limit, in_flight);
            let mut granted = 0usize;
            for _ in 0..attempts {
                if slots.try_take() {
                    granted += 1;
                }
            }
            prop_assert!(granted <= (limit as usize).saturating_sub(in_flight));
            prop_assert!(granted + in_flight <= (limit as usize).max(in_flight));
            prop_assert_eq!(granted, attempts.min((limit as usize).saturating_sub(in_flight)));
        }

        #[test]
        fn prop_expectation_never_outlives_ttl(ttl_ms in 1u64..10_000, elapsed_ms in 0u64..20_000) {
            let mut expectations = Expectations::new(Duration::from_millis(ttl_ms));
            let t0 = Instant::now();
            expectations.expect(0u32, (), t0);

            let left = expectations.settle(t0 + Duration::from_millis(elapsed_ms), |_, _| false);
            prop_assert_eq!(left == 1, elapsed_ms < ttl_ms);
        }

        #[test]
        fn prop_gate_respects_interval(interval_ms in 1u64..10_000, elapsed_ms in 0u64..20_000, size in 1u32..50) {
            let mut gate = EvictionGate::new();
            let t0 = Instant::now();
            let interval = Duration::from_millis(interval_ms);
            let first = gate.reserve(t0, interval, size);
            gate.commit(first, first.granted());

            let next = gate.reserve(t0 + Duration::from_millis(elapsed_ms), interval, size);
            if elapsed_ms < interval_ms {
                prop_assert_eq!(next.granted(), 0);
            } else {
                prop_assert_eq!(next.granted(), size as usize);
            }
        }
    }
}
