//! # twinpool - Dual Coroutine/IO Worker Pools
//!
//! The execution core of a coroutine-oriented task-dispatch runtime: two
//! fixed pools of OS threads, one running cooperative coroutine tasks and one
//! running blocking IO tasks, fed through thread-safe FIFO queues.
//!
//! ## Architecture
//!
//! - **Coroutine pool**: one dedicated queue per worker, round-robin or
//!   explicit-index posting, optional pinning of workers to cores.
//! - **IO pool**: either one dedicated queue per worker, or a single queue
//!   shared by all workers. Shared-queue workers poll with an adaptive
//!   backoff so idle workers cost little CPU yet react quickly to bursts.
//! - **Task queues**: FIFO hand-off with blocking and polling pops; closing a
//!   queue rejects new work while letting queued work drain.
//! - **Scheduler**: owns both pools, built from one immutable
//!   [`Configuration`] snapshot, and shuts them down against one deadline.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use twinpool::{BackoffPolicy, Configuration, IoTarget, Scheduler};
//!
//! let config = Configuration::new()
//!     .with_num_io_threads(4)
//!     .with_load_balance_shared_io_queues(true)
//!     .with_load_balance_poll_interval(Duration::from_millis(10))
//!     .with_load_balance_poll_interval_backoff_policy(BackoffPolicy::Exponential)
//!     .with_load_balance_poll_interval_num_backoffs(3);
//!
//! let scheduler = Scheduler::new(config).unwrap();
//! scheduler.post_io(|| println!("Hello from an IO thread!"), IoTarget::Any).unwrap();
//! scheduler.shutdown(Duration::from_secs(1)).unwrap();
//! ```

pub mod backoff;
pub mod config;
pub mod coroutine_pool;
pub mod error;
pub mod io_pool;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod scheduler;
pub mod task;
pub mod topology;
pub mod worker;

pub use backoff::{BackoffPolicy, BackoffSettings, PollState, next_interval};
pub use config::{Configuration, ThreadCounts};
pub use coroutine_pool::CoroutineThreadPool;
pub use error::SchedulerError;
pub use io_pool::{IoQueueMode, IoTarget, IoThreadPool};
pub use metrics::QueueStatsSnapshot;
pub use queue::TaskQueue;
pub use scheduler::Scheduler;
pub use task::{Task, TaskFailure, TaskOutcome};
pub use topology::{CpuTopology, StaticTopology, SystemTopology};

#[cfg(test)]
mod tests;
