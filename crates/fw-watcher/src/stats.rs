//! Per-watch dispatch statistics with atomic counters.
//!
//! Every notification that passes the filter ends up in exactly one of
//! `admitted` or `dropped`. Every admitted cycle ends up in exactly one of
//! `completed`, `failed` or `skipped` once it finishes.
//!
//! # Thread Safety
//!
//! Counters use [`Relaxed`](std::sync::atomic::Ordering::Relaxed) ordering.
//! They are informational and are written from the notify thread and from
//! dispatch tasks at the same time.
//!
//! # Examples
//!
//! ```
//! use fw_watcher::WatchStats;
//!
//! let stats = WatchStats::new();
//! stats.increment_admitted();
//! stats.increment_dropped();
//! stats.increment_completed();
//!
//! let snap = stats.snapshot();
//! assert_eq!(snap.notifications(), 2);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters describing what a watch did with its notifications.
#[derive(Debug, Default)]
pub struct WatchStats {
    /// Notifications that started a dispatch cycle.
    admitted: AtomicU64,
    /// Notifications dropped because a cycle was already running.
    dropped: AtomicU64,
    /// Cycles whose actions all succeeded.
    completed: AtomicU64,
    /// Cycles with at least one failed action.
    failed: AtomicU64,
    /// Cycles that dispatched nothing (vanished directory, settle timeout, stop).
    skipped: AtomicU64,
}

impl WatchStats {
    /// Creates a new [`WatchStats`] with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the admitted counter.
    #[inline]
    pub fn increment_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the dropped counter.
    #[inline]
    pub fn increment_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the completed counter.
    #[inline]
    pub fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the failed counter.
    #[inline]
    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the skipped counter.
    #[inline]
    pub fn increment_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`WatchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Notifications that started a dispatch cycle.
    pub admitted: u64,
    /// Notifications dropped because a cycle was already running.
    pub dropped: u64,
    /// Cycles whose actions all succeeded.
    pub completed: u64,
    /// Cycles with at least one failed action.
    pub failed: u64,
    /// Cycles that dispatched nothing.
    pub skipped: u64,
}

impl StatsSnapshot {
    /// Returns the number of notifications that reached the gate.
    #[inline]
    #[must_use]
    pub const fn notifications(&self) -> u64 {
        self.admitted + self.dropped
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "admitted {}, dropped {}, completed {}, failed {}, skipped {}",
            self.admitted, self.dropped, self.completed, self.failed, self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stats_are_zero() {
        let snap = WatchStats::new().snapshot();
        assert_eq!(snap, StatsSnapshot::default());
        assert_eq!(snap.notifications(), 0);
    }

    #[test]
    fn test_snapshot_display() {
        let stats = WatchStats::new();
        stats.increment_admitted();
        stats.increment_admitted();
        stats.increment_admitted();
        stats.increment_failed();
        stats.increment_skipped();

        let snap = stats.snapshot();
        assert_eq!(snap.notifications(), 3);
        assert_eq!(
            snap.to_string(),
            "admitted 3, dropped 0, completed 0, failed 1, skipped 1"
        );
    }

    #[test]
    fn test_snapshot_serialization() {
        let stats = WatchStats::new();
        stats.increment_admitted();
        stats.increment_dropped();
        stats.increment_dropped();
        stats.increment_completed();

        insta::assert_json_snapshot!(stats.snapshot(), @r#"
        {
          "admitted": 1,
          "dropped": 2,
          "completed": 1,
          "failed": 0,
          "skipped": 0
        }
        "#);
    }

    #[test]
    fn test_concurrent_increments() {
        let stats = WatchStats::new();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..1000 {
                        stats.increment_dropped();
                    }
                });
            }
        });
        assert_eq!(stats.snapshot().dropped, 4000);
    }
}
