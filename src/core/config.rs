//! # Engine configuration.
//!
//! [`EngineConfig`] is built in code and handed to
//! [`EngineBuilder::with_config`](crate::EngineBuilder::with_config).
//!
//! ## Sentinel values
//! - `op_timeout = 0s` → runtime operations are never timed out
//! - capacities of `0` are clamped to `1`

use std::time::Duration;

use crate::policies::RetryPolicy;

/// Settings for a [`TaskEngine`](crate::TaskEngine).
///
/// ## Field semantics
/// - `grace`: how long each Disable stage waits before aborting stragglers
/// - `op_timeout`: per runtime operation (`0s` = none)
/// - `retry`: attempt ceiling and backoff for transient runtime failures
/// - `task_buffer`: per-task emission buffer; a full buffer blocks that task's manager
/// - `stream_capacity`: capacity of each consumer-facing output stream
/// - `runtime_bus_capacity`: runtime event broadcast ring size
/// - `remove_on_stop`: remove containers once their task has stopped
/// - `eni_enabled`: accept and advertise ENI attachments
/// - `capability_namespace`: prefix of every capability identifier
///
/// Prefer the accessors over reading sentinel fields directly.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Maximum wait during Disable before abandoning stragglers.
    pub grace: Duration,

    /// Timeout applied to each runtime operation attempt.
    ///
    /// An elapsed timeout counts as a retryable failure.
    pub op_timeout: Duration,

    /// Retry ceiling and backoff for runtime operations.
    pub retry: RetryPolicy,

    /// Capacity of each task's emission buffer.
    pub task_buffer: usize,

    /// Capacity of the task-level and container-level output streams.
    pub stream_capacity: usize,

    /// Capacity of the runtime event broadcast.
    ///
    /// A manager lagging by more than this many events re-inspects its containers.
    pub runtime_bus_capacity: usize,

    /// Remove containers after their task reached STOPPED.
    pub remove_on_stop: bool,

    /// Whether ENI attachments are accepted.
    pub eni_enabled: bool,

    /// Namespace prepended to capability identifiers.
    pub capability_namespace: String,
}

impl EngineConfig {
    /// Per-operation timeout as an `Option` (`None` = unbounded).
    #[inline]
    pub fn op_timeout_opt(&self) -> Option<Duration> {
        if self.op_timeout == Duration::ZERO {
            None
        } else {
            Some(self.op_timeout)
        }
    }

    #[inline]
    pub fn task_buffer_clamped(&self) -> usize {
        self.task_buffer.max(1)
    }

    #[inline]
    pub fn stream_capacity_clamped(&self) -> usize {
        self.stream_capacity.max(1)
    }

    #[inline]
    pub fn runtime_bus_capacity_clamped(&self) -> usize {
        self.runtime_bus_capacity.max(1)
    }
}

impl Default for EngineConfig {
    /// Defaults:
    ///
    /// - `grace = 60s`
    /// - `op_timeout = 120s`
    /// - `retry = RetryPolicy::default()` (5 attempts, 250ms × 2 up to 10s, equal jitter)
    /// - `task_buffer = 64`
    /// - `stream_capacity = 1024`, `runtime_bus_capacity = 1024`
    /// - `remove_on_stop = true`, `eni_enabled = true`
    /// - `capability_namespace = "com.taskengine.capability"`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(60),
            op_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            task_buffer: 64,
            stream_capacity: 1024,
            runtime_bus_capacity: 1024,
            remove_on_stop: true,
            eni_enabled: true,
            capability_namespace: "com.taskengine.capability".to_string(),
        }
    }
}
