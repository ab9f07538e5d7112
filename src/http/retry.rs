//! Retry Policy
//!
//! Bounded exponential backoff for network failures and 5xx responses.

use std::time::Duration;

use super::client::HttpError;

/// Retry policy for outbound requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Whether a request that has already been retried `retries_done` times
    /// should be sent again after failing with `error`
    pub fn should_retry(&self, error: &HttpError, retries_done: u32) -> bool {
        retries_done < self.max_retries && error.is_retryable()
    }
}
