//! Error type shared by every layer of the scheduler.

use thiserror::Error;

/// Errors returned by posting, construction and shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The target queue was closed because shutdown has begun.
    #[error("queue is closed")]
    QueueClosed,

    /// An explicit queue index was outside the pool.
    #[error("queue index {index} is out of range (pool has {len} queues)")]
    InvalidIndex { index: usize, len: usize },

    /// The operation is not meaningful for the pool's queue topology.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// A worker could not be bound to its logical core.
    #[error("failed to pin worker to core {core}: {reason}")]
    PinningFailure { core: usize, reason: String },

    /// Workers were still running when the drain deadline passed.
    #[error("shutdown timed out with {abandoned} worker(s) still running")]
    ShutdownTimeout { abandoned: usize },

    /// The operating system refused to start a worker thread.
    #[error("failed to start worker thread {name}: {reason}")]
    ThreadSpawn { name: String, reason: String },

    /// The configuration snapshot could not be resolved.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
