//! Per-worker scheduling counters.
//!
//! Each worker owns one [`WorkerCounters`] slot and is its only writer, so
//! the relaxed increments never contend; [`MetricsSnapshot`] sums the slots
//! on demand. Counters are the crate's observability surface — there is no
//! logger to configure.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by exactly one worker.
#[derive(Debug, Default)]
pub(crate) struct WorkerCounters {
    tasks_executed: AtomicU64,
    steal_attempts: AtomicU64,
    steal_successes: AtomicU64,
}

impl WorkerCounters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_task_executed(&self) {
        self.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_steal_attempt(&self) {
        self.steal_attempts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_steal_success(&self) {
        self.steal_successes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time sum of every worker's counters.
///
/// Taken while workers run, the numbers are approximate (each counter is
/// individually consistent, the set is not). After the pool has been
/// drained they are exact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Tasks invoked to completion (including ones that panicked).
    pub tasks_executed: u64,
    /// Steal attempts across own-queue and victim-queue tries.
    pub steal_attempts: u64,
    /// Attempts that yielded a task.
    pub steal_successes: u64,
}

impl MetricsSnapshot {
    pub(crate) fn merge(&mut self, counters: &WorkerCounters) {
        self.tasks_executed += counters.tasks_executed.load(Ordering::Relaxed);
        self.steal_attempts += counters.steal_attempts.load(Ordering::Relaxed);
        self.steal_successes += counters.steal_successes.load(Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sums_across_slots() {
        let a = WorkerCounters::new();
        let b = WorkerCounters::new();
        a.record_task_executed();
        a.record_steal_attempt();
        a.record_steal_success();
        b.record_steal_attempt();

        let mut snap = MetricsSnapshot::default();
        snap.merge(&a);
        snap.merge(&b);

        assert_eq!(snap.tasks_executed, 1);
        assert_eq!(snap.steal_attempts, 2);
        assert_eq!(snap.steal_successes, 1);
    }
}
