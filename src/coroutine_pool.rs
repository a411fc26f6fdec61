//! Pool of threads running coroutine tasks.
//!
//! Every worker owns exactly one queue. Posting without a target spreads
//! tasks round-robin over the queues; posting to an index targets one worker.

use crate::config::{Configuration, resolve_thread_count};
use crate::error::SchedulerError;
use crate::metrics::QueueStatsSnapshot;
use crate::pool::{PoolState, RoundRobin, WorkerGroup};
use crate::queue::TaskQueue;
use crate::task::Task;
use crate::topology::CpuTopology;
use crate::worker::{Pinning, QueueBinding};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fixed-size pool of coroutine worker threads with dedicated queues.
#[derive(Debug)]
pub struct CoroutineThreadPool {
    group: WorkerGroup,
    cursor: RoundRobin,
}

impl CoroutineThreadPool {
    /// Builds the pool and starts its workers.
    ///
    /// The thread count sentinel is resolved against `topology`. With pinning
    /// enabled, worker `i` is pinned to core `i % pinnable_cores`; any
    /// pinning failure aborts construction.
    pub fn new(config: &Configuration, topology: Arc<dyn CpuTopology>) -> Result<Self, SchedulerError> {
        let num_threads = resolve_thread_count(
            "coroutine",
            config.num_coroutine_threads(),
            topology.logical_cores(),
        )?;
        Self::start(config, topology, num_threads)
    }

    /// Starts exactly `num_threads` workers.
    pub(crate) fn start(
        config: &Configuration,
        topology: Arc<dyn CpuTopology>,
        num_threads: usize,
    ) -> Result<Self, SchedulerError> {
        let pin = config.pin_coroutine_threads_to_cores();
        let pinnable = if pin { topology.pinnable_cores() } else { 0 };
        if pin && pinnable == 0 {
            return Err(SchedulerError::PinningFailure {
                core: 0,
                reason: "no cores are available for pinning".to_string(),
            });
        }

        let queues: Vec<_> = (0..num_threads).map(|_| Arc::new(TaskQueue::new())).collect();
        let bindings: Vec<_> = queues
            .iter()
            .enumerate()
            .map(|(i, queue)| {
                let pinning = pin.then(|| Pinning {
                    topology: topology.clone(),
                    core: i % pinnable,
                });
                (QueueBinding::Dedicated(queue.clone()), pinning)
            })
            .collect();

        let group = WorkerGroup::start("coro", queues, bindings)?;
        tracing::info!(threads = num_threads, pinned = pin, "coroutine pool started");

        Ok(CoroutineThreadPool {
            group,
            cursor: RoundRobin::new(num_threads),
        })
    }

    /// Posts a closure to the next queue in round-robin order.
    pub fn post<F>(&self, work: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Task::new(work))
    }

    /// Posts a closure to the queue of worker `index`.
    pub fn post_to<F>(&self, index: usize, work: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_to(index, Task::new(work))
    }

    /// Submits a task to the next queue in round-robin order.
    pub fn submit(&self, task: Task) -> Result<(), SchedulerError> {
        let index = self.cursor.next_index();
        self.group.queue(index)?.push(task)
    }

    /// Submits a task to the queue of worker `index`.
    pub fn submit_to(&self, index: usize, task: Task) -> Result<(), SchedulerError> {
        self.group.queue(index)?.push(task)
    }

    /// Returns the number of worker threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.group.num_workers()
    }

    pub fn state(&self) -> PoolState {
        self.group.state()
    }

    pub fn queue_stats(&self, index: usize) -> Result<QueueStatsSnapshot, SchedulerError> {
        self.group.queue_stats(index)
    }

    /// Statistics summed over all queues.
    pub fn stats(&self) -> QueueStatsSnapshot {
        self.group.total_stats()
    }

    /// Closes all queues and waits up to `drain_timeout` for the workers.
    pub fn shutdown(&self, drain_timeout: Duration) -> Result<(), SchedulerError> {
        self.group.shutdown(drain_timeout)
    }

    pub(crate) fn begin_shutdown(&self) -> bool {
        self.group.begin_shutdown()
    }

    pub(crate) fn await_termination(&self, deadline: Option<Instant>) -> Result<(), SchedulerError> {
        self.group.await_termination(deadline)
    }
}
