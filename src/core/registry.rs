//! # Task registry.
//!
//! Concurrency-safe map from task identifier to its handle (shared task data,
//! manager join handle, cancellation token, desired-status sender).
//!
//! ## Locking
//! - One async `RwLock` guards the map's *structure* only: register and
//!   restore take it for writing, lookups, listings and checkpoint capture
//!   for reading. Capture therefore excludes registration but not
//!   reconciliation.
//! - Each task's data sits behind its own short-lived std lock, written only
//!   by that task's manager.
//!
//! ```text
//! register(task) ─► [write lock] ─► duplicate? ─► ENI conflicts? ─► claim ENIs
//!                                 ─► spawn TaskManager ─► insert handle
//! ```
//!
//! A registration or a restore either completes every step or changes nothing.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::attachments::{AttachmentRegistry, EniAttachment};
use crate::checkpoint::EngineSnapshot;
use crate::core::manager::{ManagerExit, ManagerParams, SharedTask, TaskManager};
use crate::error::{EngineError, ValidationError};
use crate::events::{Bus, Dispatcher, StateChangeEvent};
use crate::runtime::RuntimeRef;
use crate::tasks::{DesiredStatus, Task, TaskStatus};

struct Handle {
    task: SharedTask,
    eni: Vec<String>,
    join: Option<JoinHandle<ManagerExit>>,
    cancel: CancellationToken,
    desired: watch::Sender<DesiredStatus>,
}

impl Handle {
    fn cloned_task(&self) -> Task {
        self.task
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub(crate) struct TaskRegistry {
    tasks: RwLock<HashMap<String, Handle>>,
    runtime: RuntimeRef,
    bus: Bus,
    dispatcher: Arc<Dispatcher>,
    params: ManagerParams,
    cancel: CancellationToken,
}

impl TaskRegistry {
    pub(crate) fn new(
        runtime: RuntimeRef,
        bus: Bus,
        dispatcher: Arc<Dispatcher>,
        params: ManagerParams,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            tasks: RwLock::new(HashMap::new()),
            runtime,
            bus,
            dispatcher,
            params,
            cancel,
        })
    }

    /// Registers a validated task and starts its manager.
    ///
    /// Returns the ENI claim events to publish once the lock is released.
    pub(crate) async fn register(
        &self,
        task: Task,
        attachments: &AttachmentRegistry,
    ) -> Result<Vec<StateChangeEvent>, EngineError> {
        let mut tasks = self.tasks.write().await;
        if self.cancel.is_cancelled() {
            return Err(EngineError::Disabled);
        }
        if tasks.contains_key(task.arn()) {
            return Err(ValidationError::DuplicateTask {
                arn: task.arn().to_string(),
            }
            .into());
        }
        Self::check_eni_references(&tasks, &task)?;
        let claims = attachments.claim_all(task.eni_references(), task.arn())?;

        let arn = task.arn().to_string();
        let handle = self.spawn(task, true);
        tasks.insert(arn.clone(), handle);
        drop(tasks);

        tracing::info!(task = %arn, "task registered");
        Ok(claims)
    }

    /// Installs a validated snapshot. Restored tasks already STOPPED get no
    /// manager.
    ///
    /// Every check runs under the write lock before anything is installed, so
    /// a rejected snapshot leaves both registries as they were.
    pub(crate) async fn restore(
        &self,
        snapshot: EngineSnapshot,
        attachments: &Arc<AttachmentRegistry>,
    ) -> Result<(), EngineError> {
        let mut tasks = self.tasks.write().await;
        if self.cancel.is_cancelled() {
            return Err(EngineError::Disabled);
        }
        for task in &snapshot.tasks {
            if tasks.contains_key(task.arn()) {
                return Err(ValidationError::DuplicateTask {
                    arn: task.arn().to_string(),
                }
                .into());
            }
            Self::check_eni_references(&tasks, task)?;
        }
        for eni in &snapshot.attachments {
            let holder = tasks
                .iter()
                .find(|(_, h)| h.eni.iter().any(|m| m == eni.mac()));
            if let Some((owner, _)) = holder {
                return Err(ValidationError::AttachmentClaimed {
                    mac: eni.mac().to_string(),
                    owner: owner.clone(),
                }
                .into());
            }
        }

        let counts = (snapshot.tasks.len(), snapshot.attachments.len());
        attachments.restore_all(snapshot.attachments)?;
        for task in snapshot.tasks {
            let arn = task.arn().to_string();
            let resume = task.known_status() != TaskStatus::Stopped;
            tracing::info!(task = %arn, resume, "task restored");
            let handle = self.spawn(task, resume);
            tasks.insert(arn, handle);
        }
        drop(tasks);

        tracing::info!(tasks = counts.0, attachments = counts.1, "snapshot restored");
        Ok(())
    }

    fn check_eni_references(
        tasks: &HashMap<String, Handle>,
        task: &Task,
    ) -> Result<(), ValidationError> {
        for mac in task.eni_references() {
            if let Some((owner, _)) = tasks.iter().find(|(_, h)| h.eni.contains(mac)) {
                return Err(ValidationError::AttachmentClaimed {
                    mac: mac.clone(),
                    owner: owner.clone(),
                });
            }
        }
        Ok(())
    }

    /// Builds a handle; spawns the manager when `run` is set.
    fn spawn(&self, task: Task, run: bool) -> Handle {
        let eni = task.eni_references().to_vec();
        let (desired, desired_rx) = watch::channel(task.desired_status());
        let cancel = self.cancel.child_token();
        let shared: SharedTask = Arc::new(StdRwLock::new(task));

        let join = run.then(|| {
            let arn = shared
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .arn()
                .to_string();
            let manager = TaskManager::new(
                Arc::clone(&shared),
                Arc::clone(&self.runtime),
                self.dispatcher.emitter(&arn),
                self.params.clone(),
            );
            tokio::spawn(manager.run(self.bus.subscribe(), desired_rx, cancel.clone()))
        });

        Handle {
            task: shared,
            eni,
            join,
            cancel,
            desired,
        }
    }

    /// Copies of every task, ordered by identifier.
    pub(crate) async fn list(&self) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut out: Vec<Task> = tasks.values().map(Handle::cloned_task).collect();
        out.sort_by(|a, b| a.arn().cmp(b.arn()));
        out
    }

    pub(crate) async fn get(&self, arn: &str) -> Option<Task> {
        self.tasks.read().await.get(arn).map(Handle::cloned_task)
    }

    /// Offers an ENI attachment, claiming it for the registered task that
    /// references it, if any.
    ///
    /// Runs under the read lock so that no registration can slip in between
    /// the owner lookup and the insert.
    pub(crate) async fn offer_attachment(
        &self,
        attachment: EniAttachment,
        attachments: &Arc<AttachmentRegistry>,
    ) -> Result<Option<StateChangeEvent>, EngineError> {
        let tasks = self.tasks.read().await;
        if self.cancel.is_cancelled() {
            return Err(EngineError::Disabled);
        }
        let owner = tasks
            .iter()
            .find(|(_, h)| h.eni.iter().any(|m| m == attachment.mac()))
            .map(|(arn, _)| arn.as_str());
        Ok(attachments.insert(attachment, owner)?)
    }

    pub(crate) async fn contains(&self, arn: &str) -> bool {
        self.tasks.read().await.contains_key(arn)
    }

    /// Asks a task's manager to tear the task down.
    pub(crate) async fn request_stop(&self, arn: &str) -> Result<(), ValidationError> {
        let tasks = self.tasks.read().await;
        let handle = tasks.get(arn).ok_or_else(|| ValidationError::UnknownTask {
            arn: arn.to_string(),
        })?;
        handle.desired.send_replace(DesiredStatus::Stopped);
        Ok(())
    }

    /// Copies tasks and attachments while registration is blocked.
    pub(crate) async fn capture(&self, attachments: &AttachmentRegistry) -> EngineSnapshot {
        let tasks = self.tasks.read().await;
        let mut copies: Vec<Task> = tasks.values().map(Handle::cloned_task).collect();
        let enis = attachments.snapshot();
        drop(tasks);

        copies.sort_by(|a, b| a.arn().cmp(b.arn()));
        EngineSnapshot::new(copies, enis)
    }

    /// Cancels every manager and waits up to `grace` for them to reach a safe point.
    ///
    /// Handles stay registered so that the final checkpoint still sees every task.
    pub(crate) async fn cancel_all(&self, grace: Duration) {
        let joins: Vec<(String, JoinHandle<ManagerExit>)> = {
            let mut tasks = self.tasks.write().await;
            tasks
                .iter_mut()
                .filter_map(|(arn, h)| {
                    h.cancel.cancel();
                    h.join.take().map(|j| (arn.clone(), j))
                })
                .collect()
        };

        let aborts: Vec<_> = joins.iter().map(|(_, j)| j.abort_handle()).collect();
        let wait = futures::future::join_all(joins.into_iter().map(|(arn, join)| async move {
            match join.await {
                Ok(exit) => tracing::debug!(task = %arn, ?exit, "task manager exited"),
                Err(e) if e.is_panic() => tracing::error!(task = %arn, "task manager panicked"),
                Err(_) => {}
            }
        }));

        if tokio::time::timeout(grace, wait).await.is_err() {
            tracing::warn!(grace_ms = grace.as_millis() as u64, "task managers exceeded grace; aborting");
            for a in aborts {
                a.abort();
            }
        }
    }
}
