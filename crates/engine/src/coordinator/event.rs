//! Events emitted by the control loop, and lifetime statistics

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::TaskOutcome;

/// Notification delivered to the caller
///
/// For every drained task the control loop emits `Result` followed by
/// `Progress`. `Finished` is emitted exactly once, after `stop()` and the
/// last worker joined.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent<T, R> {
    /// Fraction of the current pool's tasks completed, in `[0, 1]`
    ///
    /// The value never decreases within a pool. A late submission raises the
    /// target, and the reported value then holds at its previous maximum
    /// until completed/target catches up. After reaching `1.0` it stays at
    /// `1.0` for the rest of the pool, even while late tasks are still
    /// running. It restarts from `0.0` when a new pool spawns.
    Progress(f64),

    /// Raw task outcome for the caller to persist or display
    Result {
        /// The task as submitted
        task: T,
        /// Function result, error-tagged if the task failed
        outcome: TaskOutcome<R>,
    },

    /// The control loop exited
    Finished,
}

impl<T, R> EngineEvent<T, R> {
    /// Whether this is the terminal event
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Progress value, if this is a progress event
    pub fn progress(&self) -> Option<f64> {
        match self {
            Self::Progress(fraction) => Some(*fraction),
            _ => None,
        }
    }
}

/// Lifetime totals for one coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Tasks accepted by `submit`/`submit_many`
    pub submitted: u64,
    /// Tasks put on the input channel
    pub dispatched: u64,
    /// Outcomes drained from the output channel
    pub completed: u64,
    /// Drained outcomes that were error-tagged
    pub failed: u64,
    /// Worker pools spawned
    pub pools_spawned: u64,
    /// Undispatched tasks dropped by a backlog reset
    pub dropped: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub submitted: AtomicU64,
    pub dispatched: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub pools_spawned: AtomicU64,
    pub dropped: AtomicU64,
}

impl StatsCounters {
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            pools_spawned: self.pools_spawned.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_helpers() {
        let progress: EngineEvent<u8, u8> = EngineEvent::Progress(0.5);
        assert_eq!(progress.progress(), Some(0.5));
        assert!(!progress.is_finished());

        let finished: EngineEvent<u8, u8> = EngineEvent::Finished;
        assert!(finished.is_finished());
        assert_eq!(finished.progress(), None);
    }

    #[test]
    fn test_stats_snapshot() {
        let counters = StatsCounters::default();
        StatsCounters::add(&counters.submitted, 5);
        StatsCounters::add(&counters.completed, 3);
        StatsCounters::add(&counters.failed, 1);

        let stats = counters.snapshot();
        assert_eq!(stats.submitted, 5);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.dispatched, 0);

        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["submitted"], 5);
    }
}
