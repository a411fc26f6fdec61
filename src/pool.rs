//! Plumbing shared by the coroutine and IO pools.
//!
//! A [`WorkerGroup`] owns a pool's queues and worker threads and knows how to
//! start them, close them, and wait for them until a deadline. The pools on
//! top of it only decide which queue a posted task lands in.

use crate::error::SchedulerError;
use crate::metrics::QueueStatsSnapshot;
use crate::queue::TaskQueue;
use crate::worker::{Pinning, QueueBinding, WorkerConfig, WorkerState, WorkerThread};
use crossbeam::channel::{self, Receiver};
use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Lifecycle of a pool once its workers have started. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PoolState {
    Running = 0,
    /// Queues closed; workers finishing what is left.
    ShuttingDown = 1,
    Stopped = 2,
}

impl PoolState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PoolState::Running,
            1 => PoolState::ShuttingDown,
            _ => PoolState::Stopped,
        }
    }
}

/// Cyclic queue selector shared by all posting threads.
///
/// Successive calls yield `0, 1, ..., len - 1, 0, 1, ...` regardless of how
/// many threads call concurrently.
#[derive(Debug)]
pub struct RoundRobin {
    next: CachePadded<AtomicUsize>,
    len: usize,
}

impl RoundRobin {
    pub fn new(len: usize) -> Self {
        RoundRobin {
            next: CachePadded::new(AtomicUsize::new(0)),
            len: len.max(1),
        }
    }

    pub fn next_index(&self) -> usize {
        let len = self.len;
        match self
            .next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |i| Some((i + 1) % len))
        {
            Ok(i) | Err(i) => i,
        }
    }
}

/// Converts a drain timeout into a deadline; `None` means wait forever.
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Queues and worker threads of one pool.
#[derive(Debug)]
pub(crate) struct WorkerGroup {
    label: &'static str,
    queues: Vec<Arc<TaskQueue>>,
    workers: Mutex<Vec<WorkerThread>>,
    num_workers: usize,
    exits: Receiver<usize>,
    state: AtomicU8,
    /// Result of the first completed drain; later shutdowns report it again.
    outcome: Mutex<Option<Result<(), SchedulerError>>>,
}

impl WorkerGroup {
    /// Spawns one worker per binding. If any worker fails to start, the ones
    /// already running are shut down and the error is returned.
    pub(crate) fn start<I>(
        label: &'static str,
        queues: Vec<Arc<TaskQueue>>,
        bindings: I,
    ) -> Result<Self, SchedulerError>
    where
        I: IntoIterator<Item = (QueueBinding, Option<Pinning>)>,
    {
        let (exits_tx, exits_rx) = channel::unbounded();
        let mut workers = Vec::new();
        for (id, (binding, pinning)) in bindings.into_iter().enumerate() {
            let spawned = WorkerThread::spawn(WorkerConfig {
                id,
                name: format!("{label}-{id}"),
                binding,
                pinning,
                exits: exits_tx.clone(),
            });
            match spawned {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    tracing::warn!(pool = label, worker = id, error = %e, "worker failed to start");
                    for queue in &queues {
                        queue.close();
                    }
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(e);
                }
            }
        }

        Ok(WorkerGroup {
            label,
            queues,
            num_workers: workers.len(),
            workers: Mutex::new(workers),
            exits: exits_rx,
            state: AtomicU8::new(PoolState::Running as u8),
            outcome: Mutex::new(None),
        })
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub(crate) fn num_queues(&self) -> usize {
        self.queues.len()
    }

    pub(crate) fn queue(&self, index: usize) -> Result<&Arc<TaskQueue>, SchedulerError> {
        self.queues.get(index).ok_or(SchedulerError::InvalidIndex {
            index,
            len: self.queues.len(),
        })
    }

    /// Current lifecycle state. A pool whose drain timed out stays
    /// `ShuttingDown` until its detached workers have exited.
    pub(crate) fn state(&self) -> PoolState {
        let state = PoolState::from_u8(self.state.load(Ordering::Acquire));
        if state != PoolState::ShuttingDown || self.outcome.lock().is_none() {
            return state;
        }
        let drained = self
            .workers
            .lock()
            .iter()
            .all(|w| w.state() == WorkerState::Terminated);
        if drained {
            self.state.store(PoolState::Stopped as u8, Ordering::Release);
            return PoolState::Stopped;
        }
        state
    }

    pub(crate) fn queue_stats(&self, index: usize) -> Result<QueueStatsSnapshot, SchedulerError> {
        self.queue(index).map(|queue| queue.stats_snapshot())
    }

    pub(crate) fn total_stats(&self) -> QueueStatsSnapshot {
        self.queues.iter().map(|queue| queue.stats_snapshot()).sum()
    }

    /// Closes every queue and moves the workers to draining.
    ///
    /// Returns false if shutdown had already begun.
    pub(crate) fn begin_shutdown(&self) -> bool {
        if self
            .state
            .compare_exchange(
                PoolState::Running as u8,
                PoolState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        for queue in &self.queues {
            queue.close();
        }
        for worker in self.workers.lock().iter() {
            worker.begin_drain();
        }
        tracing::debug!(pool = self.label, "pool draining");
        true
    }

    /// Waits for workers to terminate until `deadline` and joins the ones
    /// that did. Workers still running are left to finish in the background.
    ///
    /// Only the first call waits; later calls return its outcome.
    pub(crate) fn await_termination(&self, deadline: Option<Instant>) -> Result<(), SchedulerError> {
        let mut outcome = self.outcome.lock();
        if let Some(outcome) = outcome.as_ref() {
            return outcome.clone();
        }
        let mut workers = self.workers.lock();

        loop {
            let running = workers
                .iter()
                .filter(|w| w.state() != WorkerState::Terminated)
                .count();
            if running == 0 {
                break;
            }
            let received = match deadline {
                Some(deadline) => self.exits.recv_deadline(deadline).is_ok(),
                None => self.exits.recv().is_ok(),
            };
            if !received {
                break;
            }
        }

        let (finished, running): (Vec<_>, Vec<_>) = workers
            .drain(..)
            .partition(|w| w.state() == WorkerState::Terminated);
        for worker in finished {
            let name = worker.name().to_string();
            if worker.join().is_err() {
                tracing::warn!(pool = self.label, worker = %name, "worker panicked");
            }
        }
        for worker in &running {
            tracing::warn!(pool = self.label, worker = worker.name(), "worker still running at deadline");
        }

        let result = match running.len() {
            0 => {
                self.state.store(PoolState::Stopped as u8, Ordering::Release);
                Ok(())
            }
            abandoned => Err(SchedulerError::ShutdownTimeout { abandoned }),
        };
        // Unjoined handles stay here so `state` can see them finish.
        *workers = running;
        *outcome = Some(result.clone());
        result
    }

    /// Full shutdown of this group alone. Idempotent.
    pub(crate) fn shutdown(&self, drain_timeout: Duration) -> Result<(), SchedulerError> {
        self.begin_shutdown();
        self.await_termination(deadline_after(drain_timeout))
    }
}

impl Drop for WorkerGroup {
    fn drop(&mut self) {
        // Workers exit on their own once their queues are closed and drained.
        for queue in &self.queues {
            queue.close();
        }
    }
}
