//! # Bounded retry of runtime operations.

use crate::policies::BackoffPolicy;

/// How often a failing runtime operation is attempted before giving up.
///
/// Only retryable failures (see [`RuntimeError::is_retryable`](crate::RuntimeError::is_retryable))
/// consume further attempts; a fatal failure ends the operation at once.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (min 1).
    pub max_attempts: u32,
    /// Delay between attempts.
    pub backoff: BackoffPolicy,
}

impl RetryPolicy {
    /// Attempt ceiling clamped to at least one.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    /// 5 attempts with [`BackoffPolicy::default`].
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffPolicy::default(),
        }
    }
}
