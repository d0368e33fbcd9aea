//! Bounded retry policy for transform requests.
//!
//! Retry control flow is parameterized on a [`Sleeper`] so tests run without
//! real waiting. Delays scale linearly with the attempt number, and pool
//! saturation has its own (longer) wait that does not consume an attempt.

use async_trait::async_trait;
use std::time::Duration;

/// Something that can wait. Production uses [`TokioSleeper`]; tests inject a
/// recorder that returns immediately.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by `tokio::time::sleep`.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Retry budget and backoff schedule for one transform request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum model attempts before the item is dropped.
    pub max_attempts: u32,
    /// Base delay after an empty/malformed/mismatched reply.
    pub invalid_reply_delay: Duration,
    /// Base delay after a transport or server error.
    pub request_error_delay: Duration,
    /// Base delay after a rate/quota error; the next attempt will draw a
    /// different key from the pool.
    pub rate_limit_delay: Duration,
    /// Wait when every pooled key is saturated. Does not consume an attempt.
    pub pool_wait: Duration,
    /// Cap on consecutive saturation waits, so a dead pool cannot spin
    /// forever.
    pub max_pool_waits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            invalid_reply_delay: Duration::from_secs(1),
            request_error_delay: Duration::from_secs(2),
            rate_limit_delay: Duration::from_secs(5),
            pool_wait: Duration::from_secs(60),
            max_pool_waits: 3,
        }
    }
}

impl RetryPolicy {
    /// Set the maximum attempt count.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Backoff before attempt `attempt + 1` after an invalid reply.
    /// Delays grow linearly: 1x, 2x, 3x the base.
    pub fn invalid_reply_backoff(&self, attempt: u32) -> Duration {
        self.invalid_reply_delay * attempt.max(1)
    }

    /// Backoff before the next attempt after a transport error.
    pub fn request_error_backoff(&self, attempt: u32) -> Duration {
        self.request_error_delay * attempt.max(1)
    }

    /// Backoff before the next attempt after a rate/quota error.
    pub fn rate_limit_backoff(&self, attempt: u32) -> Duration {
        self.rate_limit_delay * attempt.max(1)
    }
}
