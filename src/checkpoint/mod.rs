//! # Checkpoint and restore.
//!
//! - [`EngineSnapshot`] versioned export of tasks and attachments
//! - [`Saver`] storage boundary, with [`NoopSaver`] and [`MemorySaver`]
//! - `Checkpointer` coalescing worker that captures and saves snapshots

mod coordinator;
mod saver;
mod snapshot;

pub(crate) use coordinator::{CheckpointTrigger, Checkpointer};
pub use saver::{MemorySaver, NoopSaver, Saver};
pub use snapshot::{EngineSnapshot, SNAPSHOT_VERSION};
