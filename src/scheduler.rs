//! High-level scheduler interface.
//!
//! The [`Scheduler`] is the primary entry point. It owns one coroutine pool
//! and one IO pool, both built from a single [`Configuration`] snapshot, and
//! coordinates their shutdown against one shared deadline.

use crate::config::Configuration;
use crate::coroutine_pool::CoroutineThreadPool;
use crate::error::SchedulerError;
use crate::io_pool::{IoQueueMode, IoTarget, IoThreadPool};
use crate::metrics::QueueStatsSnapshot;
use crate::pool::deadline_after;
use crate::task::Task;
use crate::topology::{CpuTopology, SystemTopology};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Drain timeout used when a scheduler is dropped without an explicit shutdown.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Dual-pool task scheduler.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use twinpool::{Configuration, IoTarget, Scheduler};
///
/// let scheduler = Scheduler::new(Configuration::default()).unwrap();
///
/// scheduler.post_coroutine(|| println!("on a coroutine thread")).unwrap();
/// scheduler.post_io(|| println!("on an IO thread"), IoTarget::Any).unwrap();
///
/// scheduler.shutdown(Duration::from_secs(1)).unwrap();
/// ```
#[derive(Debug)]
pub struct Scheduler {
    coroutine: CoroutineThreadPool,
    io: IoThreadPool,
    shutdown_outcome: Mutex<Option<Result<(), SchedulerError>>>,
}

impl Scheduler {
    /// Creates a scheduler using the detected system topology.
    pub fn new(config: Configuration) -> Result<Self, SchedulerError> {
        Self::with_topology(config, Arc::new(SystemTopology::new()))
    }

    /// Creates a scheduler using an explicit topology for core detection and
    /// pinning.
    pub fn with_topology(
        config: Configuration,
        topology: Arc<dyn CpuTopology>,
    ) -> Result<Self, SchedulerError> {
        let counts = config.resolve_thread_counts(topology.logical_cores())?;
        let coroutine = CoroutineThreadPool::start(&config, topology, counts.coroutine)?;
        let io = match IoThreadPool::start(&config, counts.io) {
            Ok(io) => io,
            Err(e) => {
                if let Err(shutdown_err) = coroutine.shutdown(DEFAULT_DRAIN_TIMEOUT) {
                    tracing::warn!(error = %shutdown_err, "coroutine pool did not stop cleanly");
                }
                return Err(e);
            }
        };

        tracing::info!(
            coroutine_threads = coroutine.num_threads(),
            io_threads = io.num_threads(),
            io_mode = ?io.mode(),
            "scheduler started"
        );

        Ok(Scheduler {
            coroutine,
            io,
            shutdown_outcome: Mutex::new(None),
        })
    }

    /// Posts a closure to the coroutine pool (round-robin).
    pub fn post_coroutine<F>(&self, work: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.coroutine.post(work)
    }

    /// Posts a closure to coroutine queue `index`.
    pub fn post_coroutine_to<F>(&self, index: usize, work: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.coroutine.post_to(index, work)
    }

    /// Submits a prepared task (for example one with a failure handler) to
    /// the coroutine pool (round-robin).
    pub fn submit_coroutine(&self, task: Task) -> Result<(), SchedulerError> {
        self.coroutine.submit(task)
    }

    /// Posts a closure to the IO pool.
    pub fn post_io<F>(&self, work: F, target: IoTarget) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.io.post(work, target)
    }

    /// Submits a prepared task to the IO pool.
    pub fn submit_io(&self, task: Task, target: IoTarget) -> Result<(), SchedulerError> {
        self.io.submit(task, target)
    }

    pub fn num_coroutine_threads(&self) -> usize {
        self.coroutine.num_threads()
    }

    pub fn num_io_threads(&self) -> usize {
        self.io.num_threads()
    }

    pub fn io_queue_mode(&self) -> IoQueueMode {
        self.io.mode()
    }

    pub fn coroutine_pool(&self) -> &CoroutineThreadPool {
        &self.coroutine
    }

    pub fn io_pool(&self) -> &IoThreadPool {
        &self.io
    }

    pub fn coroutine_queue_stats(&self, index: usize) -> Result<QueueStatsSnapshot, SchedulerError> {
        self.coroutine.queue_stats(index)
    }

    pub fn io_queue_stats(&self, index: usize) -> Result<QueueStatsSnapshot, SchedulerError> {
        self.io.queue_stats(index)
    }

    /// Totals over every coroutine queue.
    pub fn coroutine_stats(&self) -> QueueStatsSnapshot {
        self.coroutine.stats()
    }

    /// Totals over every IO queue.
    pub fn io_stats(&self) -> QueueStatsSnapshot {
        self.io.stats()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown_outcome.lock().is_some()
    }

    /// Stops both pools.
    ///
    /// Closes every queue, then waits up to `drain_timeout` for the workers to
    /// finish the tasks already queued. Workers still running at the deadline
    /// are reported as [`SchedulerError::ShutdownTimeout`]; their threads keep
    /// draining in the background.
    ///
    /// Idempotent: later calls, including concurrent ones, return the outcome
    /// of the first.
    pub fn shutdown(&self, drain_timeout: Duration) -> Result<(), SchedulerError> {
        let mut outcome = self.shutdown_outcome.lock();
        if let Some(outcome) = outcome.as_ref() {
            return outcome.clone();
        }

        let deadline = deadline_after(drain_timeout);
        self.coroutine.begin_shutdown();
        self.io.begin_shutdown();
        let abandoned: usize = [
            self.coroutine.await_termination(deadline),
            self.io.await_termination(deadline),
        ]
        .into_iter()
        .map(|outcome| match outcome {
            Err(SchedulerError::ShutdownTimeout { abandoned }) => abandoned,
            _ => 0,
        })
        .sum();

        let result = if abandoned == 0 {
            tracing::info!("scheduler shut down");
            Ok(())
        } else {
            tracing::warn!(abandoned, "scheduler shutdown timed out");
            Err(SchedulerError::ShutdownTimeout { abandoned })
        };
        *outcome = Some(result.clone());
        result
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.is_shut_down() {
            return;
        }
        if let Err(e) = self.shutdown(DEFAULT_DRAIN_TIMEOUT) {
            tracing::warn!(error = %e, "scheduler dropped without a clean shutdown");
        }
    }
}
