//! Idle-poll backoff for workers sharing a queue.
//!
//! Workers reading a shared queue cannot block on it exclusively, so they poll.
//! Each empty poll grows the wait before the next one according to a
//! [`BackoffPolicy`], up to a plateau reached after `num_backoffs` steps. Any
//! successful poll drops the worker straight back to the base interval.
//!
//! The interval computation is a pure function of the consecutive-empty-poll
//! count, so it is tested here without spawning any threads.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Growth rule for the idle-poll interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackoffPolicy {
    /// Grows by one base interval per empty poll.
    #[default]
    Linear,
    /// Doubles on every empty poll.
    Exponential,
}

/// Returns the wait interval after `consecutive_empty_polls` empty polls.
///
/// The count is clamped to `num_backoffs`, so once the plateau is reached the
/// interval never grows again. With `num_backoffs == 0` the result is always
/// `base`.
pub fn next_interval(
    consecutive_empty_polls: usize,
    policy: BackoffPolicy,
    base: Duration,
    num_backoffs: usize,
) -> Duration {
    let step = consecutive_empty_polls.min(num_backoffs);
    if step == 0 {
        return base;
    }

    let factor = match policy {
        BackoffPolicy::Linear => u64::try_from(step).ok().and_then(|s| s.checked_add(1)),
        BackoffPolicy::Exponential => u32::try_from(step).ok().and_then(|s| 1u64.checked_shl(s)),
    };

    factor
        .and_then(|f| u32::try_from(f).ok())
        .and_then(|f| base.checked_mul(f))
        .unwrap_or(Duration::MAX)
}

/// Backoff parameters taken from the configuration snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSettings {
    pub policy: BackoffPolicy,
    pub base: Duration,
    pub num_backoffs: usize,
}

impl BackoffSettings {
    pub fn new(policy: BackoffPolicy, base: Duration, num_backoffs: usize) -> Self {
        Self {
            policy,
            base,
            num_backoffs,
        }
    }

    /// Interval for the given consecutive-empty-poll count.
    pub fn interval_for(&self, consecutive_empty_polls: usize) -> Duration {
        next_interval(consecutive_empty_polls, self.policy, self.base, self.num_backoffs)
    }

    /// Largest interval these settings can produce.
    pub fn plateau(&self) -> Duration {
        self.interval_for(self.num_backoffs)
    }
}

/// Per-worker polling state for a shared queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    consecutive_empty: usize,
    current: Duration,
}

impl PollState {
    pub fn new(settings: &BackoffSettings) -> Self {
        Self {
            consecutive_empty: 0,
            current: settings.base,
        }
    }

    /// Number of empty polls since the last hit.
    pub fn consecutive_empty(&self) -> usize {
        self.consecutive_empty
    }

    /// Interval used for the most recent idle wait.
    pub fn current_interval(&self) -> Duration {
        self.current
    }

    /// Records a successful poll.
    pub fn reset(&mut self, settings: &BackoffSettings) {
        self.consecutive_empty = 0;
        self.current = settings.base;
    }

    /// Records an empty poll and returns how long to wait before the next one.
    ///
    /// The wait is computed from the count before it is incremented, so the
    /// first empty poll waits exactly one base interval.
    pub fn record_empty(&mut self, settings: &BackoffSettings) -> Duration {
        let interval = settings.interval_for(self.consecutive_empty);
        self.consecutive_empty = self.consecutive_empty.saturating_add(1);
        self.current = interval;
        interval
    }
}
