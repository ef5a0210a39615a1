//! # Capability traits implemented by [`TaskEngine`](crate::TaskEngine).
//!
//! Each trait covers one role so that collaborators can depend on, and tests
//! can mock, only the role they need:
//!
//! - [`Lifecycle`] init / disable
//! - [`EventSource`] the two event streams
//! - [`SnapshotProvider`] export / restore
//! - [`RegistryReader`] read-only task lookups

use async_trait::async_trait;

use crate::checkpoint::EngineSnapshot;
use crate::error::{EngineError, InitError};
use crate::events::TaskEvents;
use crate::tasks::Task;

#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn init(&self) -> Result<(), InitError>;
    async fn disable(&self);
}

pub trait EventSource: Send + Sync {
    /// Hands out the event streams; only the first call succeeds.
    fn task_events(&self) -> Result<TaskEvents, EngineError>;
}

#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn snapshot(&self) -> EngineSnapshot;
    async fn restore(&self, snapshot: EngineSnapshot) -> Result<(), EngineError>;
}

#[async_trait]
pub trait RegistryReader: Send + Sync {
    async fn list_tasks(&self) -> Vec<Task>;
    async fn get_task_by_arn(&self, arn: &str) -> Option<Task>;
}
