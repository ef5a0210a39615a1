//! # TaskEngine: the public facade.
//!
//! Binds the registry, the per-task managers, the event dispatcher, the ENI
//! attachment registry and the checkpoint coordinator behind one contract.
//!
//! ## Architecture
//! ```text
//! add_task ──► validate ──► TaskRegistry::register ──► TaskManager (one per task)
//!                                                        │   ▲
//!                                   runtime ops ◄────────┘   │ RuntimeEvent
//!                                                            │
//! ContainerRuntime::subscribe ──► pump ──► Bus ──────────────┘
//!
//! TaskManager ──► Emitter ──► [task buffer] ──► forwarder ──┬──► tasks stream
//!                                                           ├──► containers stream
//!                                                           ├──► SubscriberSet
//!                                                           └──► CheckpointTrigger ──► Checkpointer ──► Saver
//! ```
//!
//! ## Lifecycle
//! ```text
//! build ─► CREATED ──init──► INITIALIZED ──disable──► DISABLED
//!             └──────────────disable─────────────────────┘
//! ```
//! - `init` runs once: subscribes to runtime events, loads and restores the
//!   saver's last snapshot, starts the checkpoint worker, fixes capabilities.
//! - `disable` is idempotent and irreversible:
//!   1. root token cancelled (managers, timers, workers)
//!   2. managers joined within `grace` (each finishes its in-flight operation)
//!   3. dispatcher closed (buffered events flushed, streams end)
//!   4. subscribers drained
//!   5. final checkpoint (only if `init` succeeded)
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use taskengine::{Container, RuntimeRef, Task, TaskEngine};
//!
//! # async fn demo(runtime: RuntimeRef) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = TaskEngine::builder(runtime).build();
//! engine.init().await?;
//! let mut events = engine.task_events()?;
//!
//! engine
//!     .add_task(Task::new("arn:web", vec![Container::new("app", "nginx:1.27")]))
//!     .await?;
//!
//! while let Some(ev) = events.tasks.recv().await {
//!     println!("{:?} -> {}", ev.task_arn(), ev.status().as_str());
//! }
//! engine.disable().await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::attachments::{AttachmentRegistry, EniAttachment};
use crate::checkpoint::{Checkpointer, EngineSnapshot, Saver};
use crate::core::capabilities;
use crate::core::runner::run_once;
use crate::core::traits::{EventSource, Lifecycle, RegistryReader, SnapshotProvider};
use crate::core::{EngineBuilder, EngineConfig, TaskRegistry};
use crate::error::{EngineError, InitError, PersistenceError, ValidationError};
use crate::events::{Bus, Dispatcher, TaskEvents};
use crate::runtime::{RuntimeEvent, RuntimeRef};
use crate::subscribers::SubscriberSet;
use crate::tasks::Task;

const CREATED: u8 = 0;
const INITIALIZED: u8 = 1;
const DISABLED: u8 = 2;

/// Host-local task engine.
///
/// Construct with [`TaskEngine::builder`]; every method takes `&self` and the
/// engine is shared as `Arc<TaskEngine>`.
pub struct TaskEngine {
    config: EngineConfig,
    runtime: RuntimeRef,
    saver: Arc<dyn Saver>,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<TaskRegistry>,
    attachments: Arc<AttachmentRegistry>,
    checkpointer: Arc<Checkpointer>,
    cancel: CancellationToken,

    lifecycle: tokio::sync::Mutex<()>,
    phase: AtomicU8,
    capabilities: OnceLock<Arc<[String]>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

pub(crate) struct EngineParts {
    pub config: EngineConfig,
    pub runtime: RuntimeRef,
    pub saver: Arc<dyn Saver>,
    pub bus: Bus,
    pub subs: Arc<SubscriberSet>,
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<TaskRegistry>,
    pub attachments: Arc<AttachmentRegistry>,
    pub checkpointer: Arc<Checkpointer>,
    pub cancel: CancellationToken,
}

impl TaskEngine {
    /// Starts building an engine around a runtime adapter.
    pub fn builder(runtime: RuntimeRef) -> EngineBuilder {
        EngineBuilder::new(runtime)
    }

    pub(crate) fn new_internal(parts: EngineParts) -> Self {
        Self {
            config: parts.config,
            runtime: parts.runtime,
            saver: parts.saver,
            bus: parts.bus,
            subs: parts.subs,
            dispatcher: parts.dispatcher,
            registry: parts.registry,
            attachments: parts.attachments,
            checkpointer: parts.checkpointer,
            cancel: parts.cancel,
            lifecycle: tokio::sync::Mutex::new(()),
            phase: AtomicU8::new(CREATED),
            capabilities: OnceLock::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One-time setup.
    ///
    /// ### Errors
    /// - [`InitError::AlreadyInitialized`] on a second call
    /// - [`InitError::Disabled`] after [`disable`](Self::disable)
    /// - [`InitError::Subscribe`] when the runtime event feed cannot be opened
    /// - [`InitError::Load`] / [`InitError::Restore`] when the previous snapshot
    ///   cannot be read or applied
    pub async fn init(&self) -> Result<(), InitError> {
        let _lifecycle = self.lifecycle.lock().await;
        match self.phase.load(Ordering::Acquire) {
            INITIALIZED => return Err(InitError::AlreadyInitialized),
            DISABLED => return Err(InitError::Disabled),
            _ => {}
        }

        let feed = self
            .runtime
            .subscribe()
            .await
            .map_err(InitError::Subscribe)?;

        if let Some(snapshot) = self.saver.load().await? {
            self.apply_snapshot(snapshot).await.map_err(|e| match e {
                EngineError::Snapshot(e) => InitError::Restore(e),
                EngineError::Validation(e) => InitError::Restore(e.into()),
                _ => InitError::Disabled,
            })?;
        }

        let pump = self.spawn_pump(feed);
        let worker = self.checkpointer.spawn_worker(self.cancel.clone());
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([pump, worker]);

        let caps = capabilities::compute(
            &self.config,
            self.saver.is_durable(),
            &self.runtime.features(),
        );
        let _ = self.capabilities.set(caps);

        self.phase.store(INITIALIZED, Ordering::Release);
        tracing::info!("task engine initialized");
        Ok(())
    }

    /// [`init`](Self::init), terminating the process on failure.
    ///
    /// Meant for process bootstrap only.
    pub async fn must_init(&self) {
        if let Err(e) = self.init().await {
            tracing::error!(error = %e, label = e.as_label(), "task engine init failed; exiting");
            std::process::exit(1);
        }
    }

    /// Stops the engine for good. Calling it again is a no-op.
    pub async fn disable(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let was = self.phase.swap(DISABLED, Ordering::AcqRel);
        if was == DISABLED {
            return;
        }
        tracing::info!("disabling task engine");
        let grace = self.config.grace;

        self.cancel.cancel();
        self.registry.cancel_all(grace).await;
        self.dispatcher.close(grace).await;
        self.subs.shutdown(grace).await;

        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if tokio::time::timeout(grace, futures::future::join_all(workers))
            .await
            .is_err()
        {
            tracing::warn!("engine workers exceeded grace");
        }

        if was == INITIALIZED {
            if let Err(e) = self.checkpointer.checkpoint().await {
                tracing::warn!(error = %e, label = e.as_label(), "final checkpoint failed");
            }
        }
        tracing::info!("task engine disabled");
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        match self.phase.load(Ordering::Acquire) {
            INITIALIZED => Ok(()),
            DISABLED => Err(EngineError::Disabled),
            _ => Err(EngineError::NotInitialized),
        }
    }

    fn ensure_eni(&self) -> Result<(), EngineError> {
        if self.config.eni_enabled {
            Ok(())
        } else {
            Err(EngineError::Unsupported {
                feature: "task-eni",
            })
        }
    }

    /// Validates and registers a task, then starts its manager.
    ///
    /// Returns once the task is registered; reconciliation runs in the
    /// background. Observed state in the given task is discarded.
    pub async fn add_task(&self, mut task: Task) -> Result<(), EngineError> {
        self.ensure_running()?;
        task.validate()?;
        if !task.eni_references().is_empty() {
            self.ensure_eni()?;
        }
        task.reset_observed();

        let claims = self.registry.register(task, &self.attachments).await?;
        self.attachments.publish(claims).await;
        Ok(())
    }

    /// Tears a registered task down.
    pub async fn stop_task(&self, arn: &str) -> Result<(), EngineError> {
        self.ensure_running()?;
        Ok(self.registry.request_stop(arn).await?)
    }

    /// Offers an ENI attachment and starts its expiration timer, unless a
    /// registered task already references it (then it is claimed at once).
    pub async fn add_eni_attachment(&self, attachment: EniAttachment) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.ensure_eni()?;
        if let Some(ev) = self
            .registry
            .offer_attachment(attachment, &self.attachments)
            .await?
        {
            self.attachments.publish(vec![ev]).await;
        }
        Ok(())
    }

    /// Claims an offered attachment for a registered task.
    pub async fn claim_eni_attachment(&self, mac: &str, arn: &str) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.ensure_eni()?;
        if !self.registry.contains(arn).await {
            return Err(ValidationError::UnknownTask {
                arn: arn.to_string(),
            }
            .into());
        }
        Ok(self.attachments.claim(mac, arn).await?)
    }

    /// Current registry entry for a MAC address.
    pub fn eni_attachment(&self, mac: &str) -> Option<EniAttachment> {
        self.attachments.get(mac)
    }

    /// Point-in-time copies of every registered task, ordered by identifier.
    pub async fn list_tasks(&self) -> Vec<Task> {
        self.registry.list().await
    }

    /// Copy of one task, `None` when not registered.
    pub async fn get_task_by_arn(&self, arn: &str) -> Option<Task> {
        self.registry.get(arn).await
    }

    /// Hands out the task-level and container-level event streams.
    ///
    /// Only the first call succeeds; later calls return
    /// [`EngineError::EventsTaken`].
    pub fn task_events(&self) -> Result<TaskEvents, EngineError> {
        self.dispatcher
            .take_streams()
            .ok_or(EngineError::EventsTaken)
    }

    /// Capability identifiers fixed at init.
    pub fn capabilities(&self) -> Result<Arc<[String]>, EngineError> {
        self.capabilities
            .get()
            .cloned()
            .ok_or(EngineError::NotInitialized)
    }

    /// Engine and runtime version; fails when the runtime is unreachable.
    pub async fn version(&self) -> Result<String, EngineError> {
        let runtime = run_once(self.runtime.version(), self.config.op_timeout_opt()).await?;
        Ok(format!(
            "taskengine {} (runtime {runtime})",
            env!("CARGO_PKG_VERSION")
        ))
    }

    /// Exports the full engine state.
    pub async fn snapshot(&self) -> EngineSnapshot {
        self.checkpointer.capture().await
    }

    /// Rehydrates tasks and attachments; every non-terminal task gets a manager.
    ///
    /// The snapshot must not collide with anything already registered.
    pub async fn restore(&self, snapshot: EngineSnapshot) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.apply_snapshot(snapshot).await
    }

    pub async fn export_json(&self) -> Result<String, serde_json::Error> {
        self.snapshot().await.to_json()
    }

    pub async fn restore_json(&self, json: &str) -> Result<(), EngineError> {
        let snapshot = EngineSnapshot::from_json(json)?;
        self.restore(snapshot).await
    }

    /// Saves a checkpoint now.
    pub async fn checkpoint(&self) -> Result<(), PersistenceError> {
        self.checkpointer.checkpoint().await
    }

    async fn apply_snapshot(&self, snapshot: EngineSnapshot) -> Result<(), EngineError> {
        snapshot.validate()?;
        self.registry.restore(snapshot, &self.attachments).await
    }

    fn spawn_pump(&self, mut feed: BoxStream<'static, RuntimeEvent>) -> JoinHandle<()> {
        let bus = self.bus.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    ev = feed.next() => ev,
                };
                match next {
                    Some(ev) => bus.publish(ev),
                    None => {
                        tracing::warn!("runtime event feed ended");
                        break;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Lifecycle for TaskEngine {
    async fn init(&self) -> Result<(), InitError> {
        TaskEngine::init(self).await
    }

    async fn disable(&self) {
        TaskEngine::disable(self).await
    }
}

impl EventSource for TaskEngine {
    fn task_events(&self) -> Result<TaskEvents, EngineError> {
        TaskEngine::task_events(self)
    }
}

#[async_trait]
impl SnapshotProvider for TaskEngine {
    async fn snapshot(&self) -> EngineSnapshot {
        TaskEngine::snapshot(self).await
    }

    async fn restore(&self, snapshot: EngineSnapshot) -> Result<(), EngineError> {
        TaskEngine::restore(self, snapshot).await
    }
}

#[async_trait]
impl RegistryReader for TaskEngine {
    async fn list_tasks(&self) -> Vec<Task> {
        TaskEngine::list_tasks(self).await
    }

    async fn get_task_by_arn(&self, arn: &str) -> Option<Task> {
        TaskEngine::get_task_by_arn(self, arn).await
    }
}
