//! Thread-safe FIFO hand-off between posting threads and workers.
//!
//! A [`TaskQueue`] is read either by one worker (dedicated mode), which
//! blocks on it with [`TaskQueue::pop_blocking`], or by several workers
//! (shared mode), which poll it with [`TaskQueue::pop_polling`]. Closing the
//! queue rejects further pushes and wakes every waiting or sleeping popper;
//! tasks already queued are still handed out before poppers see `Closed`.

use crate::backoff::{BackoffSettings, PollState};
use crate::error::SchedulerError;
use crate::metrics::{QueueStats, QueueStatsSnapshot};
use crate::task::Task;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// Result of a pop.
#[derive(Debug)]
pub enum Popped {
    /// The head of the queue, now owned by the caller.
    Task(Task),
    /// Nothing arrived in time. Not an error; the caller pops again.
    Empty,
    /// The queue is closed and fully drained.
    Closed,
}

/// Result of a single non-sleeping poll of a shared queue.
#[derive(Debug)]
pub enum PollAttempt {
    Ready(Task),
    /// The queue was empty; the caller should wait this long before polling again.
    Idle(Duration),
    Closed,
}

#[derive(Debug, Default)]
struct Inner {
    items: VecDeque<Task>,
    closed: bool,
}

/// A FIFO queue of tasks guarded by a mutex.
#[derive(Debug, Default)]
pub struct TaskQueue {
    inner: Mutex<Inner>,
    /// Signalled on push and close.
    available: Condvar,
    /// Signalled on close only, so polling sleeps are not cut short by pushes.
    closing: Condvar,
    stats: QueueStats,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task to the tail and wakes one blocked popper.
    pub fn push(&self, task: Task) -> Result<(), SchedulerError> {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(SchedulerError::QueueClosed);
            }
            inner.items.push_back(task);
        }
        self.stats.posted.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
        Ok(())
    }

    /// Removes the head task without waiting.
    pub fn try_pop(&self) -> Option<Task> {
        self.inner.lock().items.pop_front()
    }

    /// Removes the head task, waiting up to `timeout` for one to arrive.
    pub fn pop_blocking(&self, timeout: Duration) -> Popped {
        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.inner.lock();
        loop {
            if let Some(task) = inner.items.pop_front() {
                return Popped::Task(task);
            }
            if inner.closed {
                return Popped::Closed;
            }
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut inner, deadline).timed_out() {
                        return match inner.items.pop_front() {
                            Some(task) => Popped::Task(task),
                            None if inner.closed => Popped::Closed,
                            None => Popped::Empty,
                        };
                    }
                }
                None => self.available.wait(&mut inner),
            }
        }
    }

    /// Polls once and advances `state` without sleeping.
    ///
    /// A hit resets the state to the base interval. A miss records an empty
    /// poll and returns the interval the caller should wait.
    pub fn try_pop_polling(&self, state: &mut PollState, settings: &BackoffSettings) -> PollAttempt {
        let mut inner = self.inner.lock();
        if let Some(task) = inner.items.pop_front() {
            state.reset(settings);
            return PollAttempt::Ready(task);
        }
        if inner.closed {
            return PollAttempt::Closed;
        }
        drop(inner);

        self.stats.empty_polls.fetch_add(1, Ordering::Relaxed);
        let interval = state.record_empty(settings);
        tracing::trace!(
            consecutive_empty = state.consecutive_empty(),
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "shared queue empty, backing off"
        );
        PollAttempt::Idle(interval)
    }

    /// Polls once; on a miss sleeps for the backoff interval and returns `Empty`.
    ///
    /// The sleep ends early if the queue is closed.
    pub fn pop_polling(&self, state: &mut PollState, settings: &BackoffSettings) -> Popped {
        match self.try_pop_polling(state, settings) {
            PollAttempt::Ready(task) => Popped::Task(task),
            PollAttempt::Closed => Popped::Closed,
            PollAttempt::Idle(interval) => {
                self.sleep_unless_closed(interval);
                Popped::Empty
            }
        }
    }

    fn sleep_unless_closed(&self, interval: Duration) {
        let deadline = Instant::now().checked_add(interval);
        let mut inner = self.inner.lock();
        while !inner.closed {
            match deadline {
                Some(deadline) => {
                    if self.closing.wait_until(&mut inner, deadline).timed_out() {
                        break;
                    }
                }
                None => self.closing.wait(&mut inner),
            }
        }
    }

    /// Rejects further pushes and wakes all poppers. Idempotent.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
        }
        self.available.notify_all();
        self.closing.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Live counters for this queue.
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Snapshot of the counters together with the current length.
    pub fn stats_snapshot(&self) -> QueueStatsSnapshot {
        self.stats.snapshot(self.len())
    }
}
