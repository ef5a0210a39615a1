//! Retry policies for runtime operations.
//!
//! ## Contents
//! - [`RetryPolicy`] attempt ceiling for a single operation
//! - [`BackoffPolicy`] how delays grow between attempts (first / factor / max + jitter)
//! - [`JitterPolicy`] randomization so managers do not retry in lock-step
//!
//! ## Wiring
//! ```text
//! EngineConfig { retry: RetryPolicy { max_attempts, backoff } }
//!      └─► core::runner::run_with_retry
//!           - is_retryable() decides whether another attempt is made
//!           - backoff.next(attempt) schedules it
//! ```

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
