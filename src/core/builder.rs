use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    attachments::AttachmentRegistry,
    checkpoint::{CheckpointTrigger, Checkpointer, NoopSaver, Saver},
    core::{
        EngineConfig, TaskEngine,
        engine::EngineParts,
        manager::ManagerParams,
        registry::TaskRegistry,
    },
    events::{Bus, Dispatcher},
    runtime::RuntimeRef,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for a [`TaskEngine`].
///
/// ```no_run
/// use std::sync::Arc;
/// use taskengine::{EngineConfig, MemorySaver, RuntimeRef, TaskEngine};
///
/// # fn demo(runtime: RuntimeRef) {
/// let engine = TaskEngine::builder(runtime)
///     .with_config(EngineConfig::default())
///     .with_saver(Arc::new(MemorySaver::new()))
///     .build();
/// # }
/// ```
pub struct EngineBuilder {
    runtime: RuntimeRef,
    cfg: EngineConfig,
    saver: Arc<dyn Saver>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl EngineBuilder {
    /// Creates a builder with default configuration and no persistence.
    pub fn new(runtime: RuntimeRef) -> Self {
        Self {
            runtime,
            cfg: EngineConfig::default(),
            saver: Arc::new(NoopSaver),
            subscribers: Vec::new(),
        }
    }

    pub fn with_config(mut self, cfg: EngineConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets where checkpoints go. Without one, snapshots are discarded.
    pub fn with_saver(mut self, saver: Arc<dyn Saver>) -> Self {
        self.saver = saver;
        self
    }

    /// Sets state-change subscribers.
    ///
    /// Each subscriber gets its own worker and bounded queue, fed in the same
    /// per-task order as the event streams.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Wires every component. Nothing runs until [`TaskEngine::init`].
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Arc<TaskEngine> {
        let cancel = CancellationToken::new();
        let bus = Bus::new(self.cfg.runtime_bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers));
        let trigger = CheckpointTrigger::default();

        let dispatcher = Arc::new(Dispatcher::new(
            self.cfg.stream_capacity_clamped(),
            self.cfg.task_buffer_clamped(),
            Arc::clone(&subs),
            trigger.clone(),
        ));
        let attachments =
            AttachmentRegistry::new(dispatcher.emitter("eni-attachments"), cancel.child_token());

        let params = ManagerParams {
            retry: self.cfg.retry,
            op_timeout: self.cfg.op_timeout_opt(),
            remove_on_stop: self.cfg.remove_on_stop,
        };
        let registry = TaskRegistry::new(
            Arc::clone(&self.runtime),
            bus.clone(),
            Arc::clone(&dispatcher),
            params,
            cancel.clone(),
        );

        let checkpointer = Arc::new(Checkpointer::new(
            Arc::clone(&self.saver),
            Arc::clone(&registry),
            Arc::clone(&attachments),
            trigger,
        ));

        Arc::new(TaskEngine::new_internal(EngineParts {
            config: self.cfg,
            runtime: self.runtime,
            saver: self.saver,
            bus,
            subs,
            dispatcher,
            registry,
            attachments,
            checkpointer,
            cancel,
        }))
    }
}
