//! # Run one runtime operation with timeout and bounded retries.
//!
//! ```text
//! attempt 1 ──► op() ──► Ok ─────────────────────────────► return Ok
//!                  ├──► Err(fatal) ──────────────────────► return Failed
//!                  ├──► Err(transient | timeout)
//!                  │       ├── attempts exhausted ───────► return Failed
//!                  │       └── sleep(backoff.next(n)) ───► attempt n+1
//!                  │               └── cancelled ────────► return Cancelled
//! ```
//!
//! ## Rules
//! - A started attempt is never abandoned: it completes or hits `timeout`.
//!   Cancellation is observed only between attempts (during the backoff sleep).
//! - An elapsed timeout is reported as [`RuntimeError::Timeout`] and retried.

use std::future::Future;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::RuntimeError;
use crate::policies::RetryPolicy;

/// Why [`run_with_retry`] gave up.
#[derive(Debug)]
pub(crate) enum OpFailure {
    /// Fatal error, or retries exhausted; carries the last error.
    Failed(RuntimeError),
    /// Cancelled while waiting for the next attempt.
    Cancelled,
}

/// Runs a single attempt with an optional timeout.
pub(crate) async fn run_once<T, Fut>(fut: Fut, timeout: Option<Duration>) -> Result<T, RuntimeError>
where
    Fut: Future<Output = Result<T, RuntimeError>>,
{
    match timeout {
        Some(dur) => match time::timeout(dur, fut).await {
            Ok(res) => res,
            Err(_elapsed) => Err(RuntimeError::Timeout { timeout: dur }),
        },
        None => fut.await,
    }
}

/// Runs `op` until it succeeds, fails fatally, exhausts `policy` or is cancelled.
///
/// `label` and `container` only feed the logs (e.g. `"pull"`, `"app"`).
pub(crate) async fn run_with_retry<T, F, Fut>(
    label: &'static str,
    container: &str,
    policy: &RetryPolicy,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, OpFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RuntimeError>>,
{
    let attempts = policy.attempts();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let err = match run_once(op(), timeout).await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        if !err.is_retryable() {
            tracing::warn!(op = label, container, attempt, error = %err, "runtime operation failed permanently");
            return Err(OpFailure::Failed(err));
        }
        if attempt >= attempts {
            tracing::warn!(op = label, container, attempt, error = %err, "runtime operation retries exhausted");
            return Err(OpFailure::Failed(err));
        }

        let delay = policy.backoff.next(attempt - 1);
        tracing::debug!(
            op = label,
            container,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying runtime operation"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OpFailure::Cancelled),
            _ = time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::{BackoffPolicy, JitterPolicy};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: BackoffPolicy {
                first: Duration::from_millis(1),
                max: Duration::from_millis(5),
                factor: 2.0,
                jitter: JitterPolicy::None,
            },
        }
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let res = run_with_retry("pull", "a", &quick(3), None, &CancellationToken::new(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(RuntimeError::transient("reset"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert!(matches!(res, Ok(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> =
            run_with_retry("pull", "a", &quick(5), None, &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RuntimeError::fatal("invalid reference format")) }
            })
            .await;
        assert!(matches!(res, Err(OpFailure::Failed(RuntimeError::Fatal { .. }))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> =
            run_with_retry("start", "a", &quick(3), None, &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RuntimeError::transient("busy")) }
            })
            .await;
        assert!(matches!(res, Err(OpFailure::Failed(RuntimeError::Transient { .. }))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_retryable() {
        let res: Result<(), _> = run_with_retry(
            "stop",
            "a",
            &quick(2),
            Some(Duration::from_secs(1)),
            &CancellationToken::new(),
            || std::future::pending(),
        )
        .await;
        assert!(matches!(res, Err(OpFailure::Failed(RuntimeError::Timeout { .. }))));
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff: BackoffPolicy {
                first: Duration::from_secs(3600),
                max: Duration::from_secs(3600),
                ..quick(5).backoff
            },
        };
        let c = cancel.clone();
        let res: Result<(), _> = run_with_retry("pull", "a", &policy, None, &cancel, || {
            c.cancel();
            async { Err(RuntimeError::transient("reset")) }
        })
        .await;
        assert!(matches!(res, Err(OpFailure::Cancelled)));
    }
}
