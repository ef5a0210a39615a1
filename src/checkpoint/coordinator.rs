//! # Checkpoint coordinator.
//!
//! Checkpoints are requested after every forwarded event and coalesced: a
//! single worker waits on a [`Notify`], so a burst of requests while a save
//! is running results in exactly one more save.
//!
//! ```text
//! forwarders ── request() ──► Notify ──► worker ──► capture ──► Saver::save
//!                                                     │
//!                                       registry read lock (blocks AddTask only)
//! ```
//!
//! The registry read lock is held only while copying; `save` runs on the
//! copy with no engine lock held.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::attachments::AttachmentRegistry;
use crate::checkpoint::{EngineSnapshot, Saver};
use crate::core::TaskRegistry;
use crate::error::PersistenceError;

/// Cloneable handle used to ask for a checkpoint.
#[derive(Clone, Debug, Default)]
pub(crate) struct CheckpointTrigger {
    notify: Arc<Notify>,
}

impl CheckpointTrigger {
    /// Coalescing request; never blocks.
    pub(crate) fn request(&self) {
        self.notify.notify_one();
    }

    async fn requested(&self) {
        self.notify.notified().await;
    }
}

pub(crate) struct Checkpointer {
    saver: Arc<dyn Saver>,
    registry: Arc<TaskRegistry>,
    attachments: Arc<AttachmentRegistry>,
    trigger: CheckpointTrigger,
    saving: Mutex<()>,
}

impl Checkpointer {
    pub(crate) fn new(
        saver: Arc<dyn Saver>,
        registry: Arc<TaskRegistry>,
        attachments: Arc<AttachmentRegistry>,
        trigger: CheckpointTrigger,
    ) -> Self {
        Self {
            saver,
            registry,
            attachments,
            trigger,
            saving: Mutex::new(()),
        }
    }

    /// Copies the current state.
    pub(crate) async fn capture(&self) -> EngineSnapshot {
        self.registry.capture(&self.attachments).await
    }

    /// Captures and saves now. Saves never overlap.
    pub(crate) async fn checkpoint(&self) -> Result<(), PersistenceError> {
        let _saving = self.saving.lock().await;
        let snapshot = self.capture().await;
        self.saver.save(&snapshot).await?;
        tracing::debug!(
            tasks = snapshot.tasks.len(),
            attachments = snapshot.attachments.len(),
            "checkpoint saved"
        );
        Ok(())
    }

    /// Runs coalesced checkpoints until `cancel` fires.
    pub(crate) fn spawn_worker(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let me = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = me.trigger.requested() => {}
                }
                if let Err(e) = me.checkpoint().await {
                    tracing::warn!(error = %e, label = e.as_label(), "checkpoint failed; continuing in memory");
                }
            }
        })
    }
}
