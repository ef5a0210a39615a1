//! # taskengine
//!
//! **taskengine** is the host-local task engine of a container agent.
//!
//! It accepts declarative tasks (groups of containers with dependencies and
//! an essential flag), drives a container runtime toward each task's desired
//! state, and streams every observed state change to the consumer.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │     Task     │   │     Task     │   │ EniAttachment│
//!     │ (containers) │   │ (containers) │   │  (MAC, TTL)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  TaskEngine (facade)                                              │
//! │  - TaskRegistry (task map, one manager per task)                  │
//! │  - AttachmentRegistry (claims, expiration timers)                 │
//! │  - Dispatcher (per-producer buffers, two output streams)          │
//! │  - Checkpointer (coalesced snapshots to a Saver)                  │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ TaskManager  │   │ TaskManager  │   │ expiry timer │
//!     │ (reconcile)  │   │ (reconcile)  │   │  (per MAC)   │
//!     └┬──────▲──────┘   └┬──────▲──────┘   └┬─────────────┘
//!      │      │ RuntimeEvent     │           │
//!      │   ┌──┴──────────────────┴──┐        │
//!      │   │ Bus ◄── runtime feed   │        │
//!      │   └────────────────────────┘        │
//!      ▼ StateChangeEvent                    ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  forwarders (one per producer, order preserved)                   │
//! └──────┬───────────────────┬───────────────────┬────────────────────┘
//!        ▼                   ▼                   ▼
//!   tasks stream      containers stream    SubscriberSet ─► LogWriter, ...
//! ```
//!
//! ### Container lifecycle
//! ```text
//! (none) ─► PULLED ─► CREATED ─► RUNNING ─► STOPPED
//!                                     └──► DEAD
//! ```
//! - a container is pulled, created and started only once its dependencies run;
//! - an essential container that stops or dies takes its siblings down;
//! - fatal errors and exhausted retries end in DEAD, with the error as reason.
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                                  |
//! |-------------------|---------------------------------------------------------------|-----------------------------------------------------|
//! | **Engine**        | Init, registration, lookups, disable.                         | [`TaskEngine`], [`EngineBuilder`], [`Lifecycle`]    |
//! | **Tasks**         | Declarative tasks and derived statuses.                       | [`Task`], [`Container`], [`TaskStatus`]             |
//! | **Runtime**       | Boundary to the container runtime.                            | [`ContainerRuntime`], [`RuntimeEvent`]              |
//! | **Events**        | Ordered state changes on two streams.                         | [`TaskEvents`], [`StateChangeEvent`]                |
//! | **ENI**           | Network attachments with claim and expiry.                    | [`EniAttachment`], [`AttachmentStatus`]             |
//! | **Checkpoint**    | Versioned snapshots, pluggable storage.                       | [`EngineSnapshot`], [`Saver`], [`MemorySaver`]      |
//! | **Policies**      | Retry with backoff and jitter for runtime operations.         | [`RetryPolicy`], [`BackoffPolicy`], [`JitterPolicy`]|
//! | **Subscribers**   | Side observers of state changes.                              | [`Subscribe`], [`SubscriberSet`]                    |
//! | **Errors**        | Typed errors per concern.                                     | [`EngineError`], [`ValidationError`], [`InitError`] |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], a subscriber that mirrors
//!   state changes into `tracing`.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use taskengine::{Container, EngineConfig, MemorySaver, RuntimeRef, Task, TaskEngine};
//!
//! # async fn demo(runtime: RuntimeRef) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = TaskEngine::builder(runtime)
//!     .with_config(EngineConfig::default())
//!     .with_saver(Arc::new(MemorySaver::new()))
//!     .build();
//! engine.init().await?;
//! let mut events = engine.task_events()?;
//!
//! let task = Task::new(
//!     "arn:task/web",
//!     vec![
//!         Container::new("db", "postgres:16"),
//!         Container::new("app", "app:1.0").depends_on("db"),
//!     ],
//! );
//! engine.add_task(task).await?;
//!
//! while let Some(ev) = events.containers.recv().await {
//!     println!("{:?}/{:?} -> {}", ev.task_arn(), ev.container_name(), ev.status().as_str());
//! }
//! engine.disable().await;
//! # Ok(())
//! # }
//! ```

mod attachments;
mod checkpoint;
mod core;
mod error;
mod events;
mod policies;
mod runtime;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use attachments::{AttachmentStatus, EniAttachment};
pub use checkpoint::{EngineSnapshot, MemorySaver, NoopSaver, SNAPSHOT_VERSION, Saver};
pub use core::{
    EngineBuilder, EngineConfig, EventSource, Lifecycle, RegistryReader, SnapshotProvider,
    TaskEngine,
};
pub use error::{
    EngineError, InitError, PersistenceError, RuntimeError, SnapshotError, ValidationError,
};
pub use events::{EventKind, StateChangeEvent, StatusChange, TaskEvents};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy};
pub use runtime::{ContainerInspect, ContainerRuntime, ContainerSpec, RuntimeEvent, RuntimeRef};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{Container, ContainerStatus, DesiredStatus, PortBinding, Task, TaskStatus};

// Optional: expose a simple built-in logger subscriber (demo/reference).
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
