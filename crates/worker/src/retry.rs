//! Retry scheduling for failed stage attempts.

use std::time::Duration;

use rand::Rng;

/// Default pause before a failed attempt is re-queued.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// How long the worker waits before re-queueing a failed attempt.
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// The same pause after every failure.
    Fixed { delay: Duration },
    /// Exponential backoff with full jitter: after the n-th failure, wait a
    /// uniformly random duration in `0..=min(base * 2^(n-1), max_delay)`.
    Exponential { base: Duration, max_delay: Duration },
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        RetryPolicy::Fixed { delay }
    }

    pub fn exponential(base: Duration, max_delay: Duration) -> Self {
        RetryPolicy::Exponential { base, max_delay }
    }

    /// Delay to apply after the `failures`-th consecutive failure.
    pub fn delay_for(&self, failures: u32) -> Duration {
        match self {
            RetryPolicy::Fixed { delay } => *delay,
            RetryPolicy::Exponential { base, max_delay } => {
                // Cap the exponent so the shift cannot overflow.
                let exponent = failures.saturating_sub(1).min(16);
                let ceiling_ms = base
                    .as_millis()
                    .saturating_mul(1u128 << exponent)
                    .min(max_delay.as_millis()) as u64;
                let jittered = rand::rng().random_range(0..=ceiling_ms);
                Duration::from_millis(jittered)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::fixed(DEFAULT_RETRY_DELAY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
