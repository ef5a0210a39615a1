//! Engine core: the facade and the machinery behind it.
//!
//! The public API from this module is [`TaskEngine`] (built with
//! [`EngineBuilder`], configured with [`EngineConfig`]) and the capability
//! traits it implements.
//!
//! Internal modules:
//! - [`registry`]: task map, manager spawning, snapshot capture;
//! - [`manager`]: one reconciliation loop per task;
//! - [`plan`]: picks the next runtime operation for a task;
//! - [`runner`]: runs one runtime operation with timeout, retry and cancellation;
//! - [`capabilities`]: capability identifiers advertised after init.

mod builder;
mod capabilities;
mod config;
mod engine;
mod manager;
mod plan;
mod registry;
mod runner;
mod traits;

pub use builder::EngineBuilder;
pub use config::EngineConfig;
pub use engine::TaskEngine;
pub(crate) use registry::TaskRegistry;
pub use traits::{EventSource, Lifecycle, RegistryReader, SnapshotProvider};
