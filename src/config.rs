//! Configuration snapshot consumed by the scheduler at construction.
//!
//! A [`Configuration`] is a plain value. It is built with the `with_*`
//! methods (or deserialized), handed to [`Scheduler`](crate::Scheduler) by
//! value, and never touched again. Thread counts are resolved exactly once,
//! when the pools are built.

use crate::backoff::{BackoffPolicy, BackoffSettings};
use crate::error::SchedulerError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thread count sentinel meaning "one thread per available core".
pub const THREADS_PER_CORE: i32 = -1;

pub const DEFAULT_NUM_IO_THREADS: i32 = 5;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options for both worker pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    num_coroutine_threads: i32,
    num_io_threads: i32,
    pin_coroutine_threads_to_cores: bool,
    load_balance_shared_io_queues: bool,
    #[serde(rename = "load_balance_poll_interval_ms", with = "duration_ms")]
    load_balance_poll_interval: Duration,
    load_balance_poll_interval_backoff_policy: BackoffPolicy,
    load_balance_poll_interval_num_backoffs: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            num_coroutine_threads: THREADS_PER_CORE,
            num_io_threads: DEFAULT_NUM_IO_THREADS,
            pin_coroutine_threads_to_cores: false,
            load_balance_shared_io_queues: false,
            load_balance_poll_interval: DEFAULT_POLL_INTERVAL,
            load_balance_poll_interval_backoff_policy: BackoffPolicy::Linear,
            load_balance_poll_interval_num_backoffs: 0,
        }
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of coroutine threads; [`THREADS_PER_CORE`] means one per core.
    pub fn with_num_coroutine_threads(mut self, num: i32) -> Self {
        self.num_coroutine_threads = num;
        self
    }

    /// Number of IO threads; [`THREADS_PER_CORE`] means one per core.
    pub fn with_num_io_threads(mut self, num: i32) -> Self {
        self.num_io_threads = num;
        self
    }

    /// Pin each coroutine thread to a logical core.
    ///
    /// Works best when the coroutine thread count does not exceed the core count.
    pub fn with_pin_coroutine_threads_to_cores(mut self, value: bool) -> Self {
        self.pin_coroutine_threads_to_cores = value;
        self
    }

    /// Serve "any" IO posts from one queue shared by all IO threads.
    ///
    /// The IO threads then poll, which costs CPU even when idle.
    pub fn with_load_balance_shared_io_queues(mut self, value: bool) -> Self {
        self.load_balance_shared_io_queues = value;
        self
    }

    /// Base interval between polls of the shared IO queue.
    pub fn with_load_balance_poll_interval(mut self, interval: Duration) -> Self {
        self.load_balance_poll_interval = interval;
        self
    }

    pub fn with_load_balance_poll_interval_backoff_policy(mut self, policy: BackoffPolicy) -> Self {
        self.load_balance_poll_interval_backoff_policy = policy;
        self
    }

    /// Number of backoff steps before the poll interval stops growing.
    pub fn with_load_balance_poll_interval_num_backoffs(mut self, num_backoffs: usize) -> Self {
        self.load_balance_poll_interval_num_backoffs = num_backoffs;
        self
    }

    pub fn num_coroutine_threads(&self) -> i32 {
        self.num_coroutine_threads
    }

    pub fn num_io_threads(&self) -> i32 {
        self.num_io_threads
    }

    pub fn pin_coroutine_threads_to_cores(&self) -> bool {
        self.pin_coroutine_threads_to_cores
    }

    pub fn load_balance_shared_io_queues(&self) -> bool {
        self.load_balance_shared_io_queues
    }

    pub fn load_balance_poll_interval(&self) -> Duration {
        self.load_balance_poll_interval
    }

    pub fn load_balance_poll_interval_backoff_policy(&self) -> BackoffPolicy {
        self.load_balance_poll_interval_backoff_policy
    }

    pub fn load_balance_poll_interval_num_backoffs(&self) -> usize {
        self.load_balance_poll_interval_num_backoffs
    }

    /// Backoff parameters for shared-queue polling.
    pub fn backoff_settings(&self) -> BackoffSettings {
        BackoffSettings::new(
            self.load_balance_poll_interval_backoff_policy,
            self.load_balance_poll_interval,
            self.load_balance_poll_interval_num_backoffs,
        )
    }

    /// Checks every option without spawning anything.
    pub fn validate(&self, available_cores: usize) -> Result<(), SchedulerError> {
        self.resolve_thread_counts(available_cores).map(|_| ())
    }

    /// Resolves both pool sizes against `available_cores` and checks the
    /// remaining options. The pools are built from the returned counts.
    pub fn resolve_thread_counts(&self, available_cores: usize) -> Result<ThreadCounts, SchedulerError> {
        let coroutine = resolve_thread_count("coroutine", self.num_coroutine_threads, available_cores)?;
        let io = resolve_thread_count("io", self.num_io_threads, available_cores)?;
        if self.load_balance_shared_io_queues && self.load_balance_poll_interval.is_zero() {
            return Err(SchedulerError::InvalidConfiguration(
                "load_balance_poll_interval must be non-zero in shared queue mode".to_string(),
            ));
        }
        Ok(ThreadCounts { coroutine, io })
    }
}

/// Pool sizes after sentinel expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadCounts {
    pub coroutine: usize,
    pub io: usize,
}

/// Resolves a configured thread count.
///
/// [`THREADS_PER_CORE`] becomes `available_cores` (at least 1). Zero and any
/// other negative value are rejected.
pub fn resolve_thread_count(
    pool: &str,
    requested: i32,
    available_cores: usize,
) -> Result<usize, SchedulerError> {
    match requested {
        THREADS_PER_CORE => Ok(available_cores.max(1)),
        n if n >= 1 => Ok(n as usize),
        n => Err(SchedulerError::InvalidConfiguration(format!(
            "{pool} thread count must be at least 1 or {THREADS_PER_CORE}, got {n}"
        ))),
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
