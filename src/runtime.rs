//! # Container runtime boundary.
//!
//! The engine never talks to a container runtime directly. It drives one
//! through [`ContainerRuntime`], which an adapter implements on top of the
//! real client. Implementations must tolerate concurrent calls from every
//! task manager at once.
//!
//! Every operation distinguishes retryable failures
//! ([`RuntimeError::Transient`]) from permanent ones ([`RuntimeError::Fatal`]).

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::RuntimeError;
use crate::tasks::{ContainerStatus, PortBinding};

/// What the runtime needs to create a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Owning task; adapters usually turn it into a label.
    pub task_arn: String,
    pub container_name: String,
    pub image: String,
    pub port_bindings: Vec<PortBinding>,
}

/// A status change reported by the runtime's event subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeEvent {
    /// Runtime id as returned by [`ContainerRuntime::create`].
    pub container_id: String,
    pub status: ContainerStatus,
    pub at: SystemTime,
    /// Failure reported with the change (exit reason, OOM, ...).
    pub error: Option<String>,
}

impl RuntimeEvent {
    pub fn new(container_id: impl Into<String>, status: ContainerStatus) -> Self {
        Self {
            container_id: container_id.into(),
            status,
            at: SystemTime::now(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Result of [`ContainerRuntime::inspect`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerInspect {
    pub id: String,
    /// `None` when the runtime no longer knows the container.
    pub status: Option<ContainerStatus>,
    pub error: Option<String>,
}

/// # Lifecycle operations against a container runtime.
///
/// ```
/// use async_trait::async_trait;
/// use futures::stream::{self, BoxStream, StreamExt};
/// use taskengine::{ContainerInspect, ContainerRuntime, ContainerSpec, RuntimeError, RuntimeEvent};
///
/// struct Offline;
///
/// #[async_trait]
/// impl ContainerRuntime for Offline {
///     async fn pull(&self, _image: &str) -> Result<(), RuntimeError> {
///         Err(RuntimeError::transient("registry unreachable"))
///     }
///     async fn create(&self, _spec: &ContainerSpec) -> Result<String, RuntimeError> {
///         Err(RuntimeError::transient("daemon unreachable"))
///     }
///     async fn start(&self, _id: &str) -> Result<(), RuntimeError> { Ok(()) }
///     async fn stop(&self, _id: &str) -> Result<(), RuntimeError> { Ok(()) }
///     async fn remove(&self, _id: &str) -> Result<(), RuntimeError> { Ok(()) }
///     async fn inspect(&self, id: &str) -> Result<ContainerInspect, RuntimeError> {
///         Ok(ContainerInspect { id: id.to_string(), status: None, error: None })
///     }
///     async fn subscribe(&self) -> Result<BoxStream<'static, RuntimeEvent>, RuntimeError> {
///         Ok(stream::empty().boxed())
///     }
///     async fn version(&self) -> Result<String, RuntimeError> {
///         Err(RuntimeError::transient("daemon unreachable"))
///     }
/// }
/// ```
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Makes `image` available locally.
    async fn pull(&self, image: &str) -> Result<(), RuntimeError>;

    /// Creates a container and returns its runtime id.
    async fn create(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    async fn start(&self, id: &str) -> Result<(), RuntimeError>;

    async fn stop(&self, id: &str) -> Result<(), RuntimeError>;

    async fn remove(&self, id: &str) -> Result<(), RuntimeError>;

    async fn inspect(&self, id: &str) -> Result<ContainerInspect, RuntimeError>;

    /// Opens the runtime's event feed. Called once, at engine init.
    async fn subscribe(&self) -> Result<BoxStream<'static, RuntimeEvent>, RuntimeError>;

    /// Runtime version; fails when the runtime is unreachable.
    async fn version(&self) -> Result<String, RuntimeError>;

    /// Optional features of this runtime (e.g. `"gpu"`), advertised as capabilities.
    fn features(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Shared handle to a runtime adapter.
pub type RuntimeRef = Arc<dyn ContainerRuntime>;
