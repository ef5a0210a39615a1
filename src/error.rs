//! Error types used by the task engine.
//!
//! Errors are split by concern:
//!
//! - [`ValidationError`]: a task or attachment was rejected before any side effect.
//! - [`RuntimeError`]: a container runtime operation failed (transient, fatal or timed out).
//! - [`PersistenceError`]: the [`Saver`](crate::Saver) could not store or load a snapshot.
//! - [`SnapshotError`]: a snapshot could not be decoded or applied.
//! - [`InitError`]: [`TaskEngine::init`](crate::TaskEngine::init) failed.
//! - [`EngineError`]: errors returned by the engine facade.
//!
//! Every type provides `as_label` (a stable snake_case label for logs).

use std::time::Duration;
use thiserror::Error;

/// # A task definition or attachment was rejected.
///
/// Returned synchronously; no registry or attachment state changes when it occurs.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A task with this identifier is already registered.
    #[error("task '{arn}' is already registered")]
    DuplicateTask { arn: String },

    /// The task identifier is empty.
    #[error("task identifier is empty")]
    EmptyIdentifier,

    /// The task declares no containers.
    #[error("task '{arn}' has no containers")]
    NoContainers { arn: String },

    /// A container has an empty name.
    #[error("task '{arn}' has a container with an empty name")]
    EmptyContainerName { arn: String },

    /// Two containers in the same task share a name.
    #[error("container '{container}' is declared twice")]
    DuplicateContainer { container: String },

    /// A container has no image reference.
    #[error("container '{container}' has no image")]
    MissingImage { container: String },

    /// A dependency names a container that does not exist in the task.
    #[error("container '{container}' depends on unknown container '{dependency}'")]
    DanglingDependency {
        container: String,
        dependency: String,
    },

    /// Dependencies form a cycle through this container.
    #[error("dependency cycle through container '{container}'")]
    DependencyCycle { container: String },

    /// The attachment is already owned by another task.
    #[error("eni attachment '{mac}' is already claimed by task '{owner}'")]
    AttachmentClaimed { mac: String, owner: String },

    /// An attachment with this MAC address already exists.
    #[error("eni attachment '{mac}' already exists")]
    DuplicateAttachment { mac: String },

    /// No task with this identifier is registered.
    #[error("task '{arn}' is not registered")]
    UnknownTask { arn: String },

    /// No attachment with this MAC address is known.
    #[error("eni attachment '{mac}' is not known")]
    UnknownAttachment { mac: String },

    /// The attachment already expired and cannot be reinstalled.
    #[error("eni attachment '{mac}' has expired")]
    ExpiredAttachment { mac: String },
}

impl ValidationError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ValidationError::DuplicateTask { .. } => "duplicate_task",
            ValidationError::EmptyIdentifier => "empty_identifier",
            ValidationError::NoContainers { .. } => "no_containers",
            ValidationError::EmptyContainerName { .. } => "empty_container_name",
            ValidationError::DuplicateContainer { .. } => "duplicate_container",
            ValidationError::MissingImage { .. } => "missing_image",
            ValidationError::DanglingDependency { .. } => "dangling_dependency",
            ValidationError::DependencyCycle { .. } => "dependency_cycle",
            ValidationError::AttachmentClaimed { .. } => "attachment_claimed",
            ValidationError::DuplicateAttachment { .. } => "duplicate_attachment",
            ValidationError::UnknownTask { .. } => "unknown_task",
            ValidationError::UnknownAttachment { .. } => "unknown_attachment",
            ValidationError::ExpiredAttachment { .. } => "expired_attachment",
        }
    }
}

/// # Errors reported by a container runtime operation.
///
/// Some errors are retryable (`Transient`, `Timeout`), `Fatal` is not.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The operation failed but may succeed if retried.
    #[error("transient runtime error: {error}")]
    Transient {
        /// The underlying error message.
        error: String,
    },

    /// The operation can never succeed (e.g. malformed image reference).
    #[error("fatal runtime error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// The operation did not complete within the configured timeout.
    #[error("runtime operation timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },
}

impl RuntimeError {
    /// Shorthand for [`RuntimeError::Transient`].
    pub fn transient(error: impl Into<String>) -> Self {
        RuntimeError::Transient {
            error: error.into(),
        }
    }

    /// Shorthand for [`RuntimeError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        RuntimeError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use taskengine::RuntimeError;
    ///
    /// assert_eq!(RuntimeError::fatal("bad image").as_label(), "runtime_fatal");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Transient { .. } => "runtime_transient",
            RuntimeError::Fatal { .. } => "runtime_fatal",
            RuntimeError::Timeout { .. } => "runtime_timeout",
        }
    }

    /// Indicates whether the operation is worth retrying.
    ///
    /// # Example
    /// ```
    /// use taskengine::RuntimeError;
    ///
    /// assert!(RuntimeError::transient("connection reset").is_retryable());
    /// assert!(!RuntimeError::fatal("invalid reference format").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RuntimeError::Transient { .. } | RuntimeError::Timeout { .. }
        )
    }
}

/// # Errors raised by a [`Saver`](crate::Saver).
///
/// Never fatal to the engine: checkpoint failures are logged and in-memory
/// operation continues.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The snapshot could not be stored.
    #[error("failed to save snapshot: {error}")]
    Save { error: String },

    /// A previously stored snapshot could not be read.
    #[error("failed to load snapshot: {error}")]
    Load { error: String },

    /// The snapshot could not be encoded.
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PersistenceError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            PersistenceError::Save { .. } => "persistence_save",
            PersistenceError::Load { .. } => "persistence_load",
            PersistenceError::Encode(_) => "persistence_encode",
        }
    }
}

/// # A snapshot could not be decoded or applied.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The JSON form is malformed.
    #[error("malformed snapshot: {0}")]
    Decode(#[from] serde_json::Error),

    /// The snapshot was written by a newer engine.
    #[error("unsupported snapshot version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// The snapshot contains a task or attachment the engine rejects.
    #[error("invalid snapshot content: {0}")]
    Invalid(#[from] ValidationError),
}

impl SnapshotError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SnapshotError::Decode(_) => "snapshot_decode",
            SnapshotError::UnsupportedVersion { .. } => "snapshot_unsupported_version",
            SnapshotError::Invalid(_) => "snapshot_invalid",
        }
    }
}

/// # [`TaskEngine::init`](crate::TaskEngine::init) failed.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum InitError {
    /// `init` was already called on this engine.
    #[error("task engine is already initialized")]
    AlreadyInitialized,

    /// The engine was disabled before it was initialized.
    #[error("task engine is disabled")]
    Disabled,

    /// The runtime event subscription could not be established.
    #[error("failed to subscribe to runtime events: {0}")]
    Subscribe(#[source] RuntimeError),

    /// The saver could not provide the previous snapshot.
    #[error(transparent)]
    Load(#[from] PersistenceError),

    /// The previous snapshot is corrupt or unsupported.
    #[error("failed to restore snapshot: {0}")]
    Restore(#[from] SnapshotError),
}

impl InitError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            InitError::AlreadyInitialized => "init_already_initialized",
            InitError::Disabled => "init_disabled",
            InitError::Subscribe(_) => "init_subscribe",
            InitError::Load(_) => "init_load",
            InitError::Restore(_) => "init_restore",
        }
    }
}

/// # Errors returned by the [`TaskEngine`](crate::TaskEngine) facade.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EngineError {
    /// The request was rejected by validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The engine was disabled and accepts no further work.
    #[error("task engine is disabled")]
    Disabled,

    /// The engine has not been initialized yet.
    #[error("task engine is not initialized")]
    NotInitialized,

    /// The task event streams were already handed out.
    #[error("task event streams were already taken")]
    EventsTaken,

    /// The feature is switched off in the engine configuration.
    #[error("{feature} is not enabled")]
    Unsupported { feature: &'static str },

    /// The container runtime is unreachable or failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A snapshot could not be applied.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::Validation(e) => e.as_label(),
            EngineError::Disabled => "engine_disabled",
            EngineError::NotInitialized => "engine_not_initialized",
            EngineError::EventsTaken => "engine_events_taken",
            EngineError::Unsupported { .. } => "engine_unsupported",
            EngineError::Runtime(e) => e.as_label(),
            EngineError::Snapshot(e) => e.as_label(),
        }
    }
}
