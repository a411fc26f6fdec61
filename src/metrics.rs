//! Per-queue statistics.
//!
//! Counters are updated with relaxed atomics by posting callers and workers
//! and read through point-in-time snapshots.

use std::iter::Sum;
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters attached to a [`TaskQueue`](crate::queue::TaskQueue).
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Tasks accepted by `push`.
    pub posted: AtomicU64,
    /// Tasks that ran to completion.
    pub completed: AtomicU64,
    /// Tasks whose body panicked.
    pub failed: AtomicU64,
    /// Polls of a shared queue that found nothing.
    pub empty_polls: AtomicU64,
}

impl QueueStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the counters; `len` is the queue length at the
    /// time of the call.
    pub fn snapshot(&self, len: usize) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            posted: self.posted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            len,
        }
    }
}

/// Snapshot of queue statistics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatsSnapshot {
    pub posted: u64,
    pub completed: u64,
    pub failed: u64,
    pub empty_polls: u64,
    pub len: usize,
}

impl QueueStatsSnapshot {
    /// Tasks that were executed, successfully or not.
    pub fn executed(&self) -> u64 {
        self.completed + self.failed
    }
}

impl Add for QueueStatsSnapshot {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            posted: self.posted + rhs.posted,
            completed: self.completed + rhs.completed,
            failed: self.failed + rhs.failed,
            empty_polls: self.empty_polls + rhs.empty_polls,
            len: self.len + rhs.len,
        }
    }
}

impl Sum for QueueStatsSnapshot {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}
