//! # Task data model.
//!
//! - [`Task`] declarative task plus derived status
//! - [`Container`] one container of a task, with [`PortBinding`]s
//! - [`ContainerStatus`], [`TaskStatus`], [`DesiredStatus`] lifecycle enums

mod container;
mod status;
mod task;

pub use container::{Container, PortBinding};
pub use status::{ContainerStatus, DesiredStatus, TaskStatus};
pub use task::Task;
