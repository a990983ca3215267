//! Exponential backoff used by the transport while establishing a zookeeper session.
//! The delay for attempt `n` is `base_sleep * 2^n`, bounded by `max_sleep`. Once `n` reaches
//! `max_retries` the policy gives up.
//! The struct is `Copy` and holds no counters, the caller owns the attempt number, so the same
//! policy can be queried from several retry loops at once.

use std::time::Duration;
use tracing::warn;

/// Above this exponent the delay no longer fits the 32 bit millisecond range used by zookeeper
/// client libraries.
pub const MAX_RETRIES_LIMIT: u32 = 29;

/// Used when no explicit `max_sleep` is configured.
pub const DEFAULT_MAX_SLEEP: Duration = Duration::from_millis(i32::MAX as u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_sleep: Duration,
    max_retries: u32,
    max_sleep: Duration,
    max_elapsed: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(base_sleep: Duration, max_retries: u32) -> Self {
        let max_retries = if max_retries > MAX_RETRIES_LIMIT {
            warn!(
                "max_retries too large ({}). Pinning to {}",
                max_retries, MAX_RETRIES_LIMIT
            );
            MAX_RETRIES_LIMIT
        } else {
            max_retries
        };
        Self { base_sleep, max_retries, max_sleep: DEFAULT_MAX_SLEEP, max_elapsed: None }
    }

    /// Caps every single delay to `max_sleep`.
    pub fn with_max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep;
        self
    }

    /// Gives up in `allow_retry` once the total time spent retrying reaches `max_elapsed`.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    pub fn base_sleep(&self) -> Duration {
        self.base_sleep
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// `next_delay` returns how long to sleep before retry number `attempt` (zero based), or None
    /// once the attempts are exhausted.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        // attempt < MAX_RETRIES_LIMIT, the shift cannot overflow.
        let delay = self.base_sleep.checked_mul(1u32 << attempt).unwrap_or(self.max_sleep);
        Some(delay.min(self.max_sleep))
    }

    /// `allow_retry` is `next_delay` with the elapsed budget applied on top.
    pub fn allow_retry(&self, attempt: u32, elapsed: Duration) -> Option<Duration> {
        match self.max_elapsed {
            Some(budget) if elapsed >= budget => None,
            _ => self.next_delay(attempt),
        }
    }
}
