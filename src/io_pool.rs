//! Pool of threads running blocking IO tasks.
//!
//! The queue topology is chosen once, at construction:
//!
//! - **Dedicated**: one queue per worker, like the coroutine pool. Workers
//!   block on their own queue, which keeps latency low, but an unlucky
//!   round-robin choice can leave a task waiting behind a slow one.
//! - **Shared**: a single queue read by every worker. Idle workers poll it and
//!   back off while it stays empty, trading some CPU for automatic load
//!   spreading. Each worker keeps its own poll state, so a busy worker stays
//!   at the base interval while a starved one backs off to the plateau.

use crate::config::{Configuration, resolve_thread_count};
use crate::error::SchedulerError;
use crate::metrics::QueueStatsSnapshot;
use crate::pool::{PoolState, RoundRobin, WorkerGroup};
use crate::queue::TaskQueue;
use crate::task::Task;
use crate::topology::CpuTopology;
use crate::worker::QueueBinding;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Queue topology of an [`IoThreadPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoQueueMode {
    Dedicated,
    Shared,
}

/// Where an IO task should be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoTarget {
    /// Let the pool choose.
    #[default]
    Any,
    /// The queue of a specific worker. Dedicated mode only.
    Index(usize),
}

/// Fixed-size pool of IO worker threads.
#[derive(Debug)]
pub struct IoThreadPool {
    group: WorkerGroup,
    mode: IoQueueMode,
    cursor: RoundRobin,
}

impl IoThreadPool {
    /// Builds the pool and starts its workers. IO workers are never pinned.
    pub fn new(config: &Configuration, topology: Arc<dyn CpuTopology>) -> Result<Self, SchedulerError> {
        let num_threads = resolve_thread_count("io", config.num_io_threads(), topology.logical_cores())?;
        Self::start(config, num_threads)
    }

    /// Starts exactly `num_threads` workers.
    pub(crate) fn start(config: &Configuration, num_threads: usize) -> Result<Self, SchedulerError> {
        let (mode, group) = if config.load_balance_shared_io_queues() {
            let settings = config.backoff_settings();
            if settings.base.is_zero() {
                return Err(SchedulerError::InvalidConfiguration(
                    "load_balance_poll_interval must be non-zero in shared queue mode".to_string(),
                ));
            }
            let queue = Arc::new(TaskQueue::new());
            let bindings = (0..num_threads).map(|_| {
                let binding = QueueBinding::Shared {
                    queue: queue.clone(),
                    settings,
                };
                (binding, None)
            });
            let group = WorkerGroup::start("io", vec![queue.clone()], bindings)?;
            tracing::info!(
                threads = num_threads,
                poll_interval_ms = u64::try_from(settings.base.as_millis()).unwrap_or(u64::MAX),
                backoff_policy = ?settings.policy,
                num_backoffs = settings.num_backoffs,
                "io pool started with shared queue"
            );
            (IoQueueMode::Shared, group)
        } else {
            let queues: Vec<_> = (0..num_threads).map(|_| Arc::new(TaskQueue::new())).collect();
            let bindings: Vec<_> = queues
                .iter()
                .map(|queue| (QueueBinding::Dedicated(queue.clone()), None))
                .collect();
            let group = WorkerGroup::start("io", queues, bindings)?;
            tracing::info!(threads = num_threads, "io pool started with dedicated queues");
            (IoQueueMode::Dedicated, group)
        };

        Ok(IoThreadPool {
            cursor: RoundRobin::new(group.num_queues()),
            group,
            mode,
        })
    }

    /// Posts a closure to the queue selected by `target`.
    pub fn post<F>(&self, work: F, target: IoTarget) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Task::new(work), target)
    }

    /// Submits a task to the queue selected by `target`.
    pub fn submit(&self, task: Task, target: IoTarget) -> Result<(), SchedulerError> {
        match target {
            IoTarget::Any => self.submit_any(task),
            IoTarget::Index(index) => self.submit_to(index, task),
        }
    }

    /// Shared mode pushes to the one queue; dedicated mode round-robins.
    pub fn submit_any(&self, task: Task) -> Result<(), SchedulerError> {
        let index = match self.mode {
            IoQueueMode::Shared => 0,
            IoQueueMode::Dedicated => self.cursor.next_index(),
        };
        self.group.queue(index)?.push(task)
    }

    /// Submits to the queue of worker `index`. Not available in shared mode.
    pub fn submit_to(&self, index: usize, task: Task) -> Result<(), SchedulerError> {
        if self.mode == IoQueueMode::Shared {
            return Err(SchedulerError::UnsupportedOperation(
                "explicit queue index on a shared IO queue",
            ));
        }
        self.group.queue(index)?.push(task)
    }

    pub fn mode(&self) -> IoQueueMode {
        self.mode
    }

    /// Returns the number of worker threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.group.num_workers()
    }

    /// One per worker in dedicated mode, one in shared mode.
    pub fn num_queues(&self) -> usize {
        self.group.num_queues()
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
