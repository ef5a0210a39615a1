//! # TaskManager: reconciliation loop for one task.
//!
//! Drives the containers of a single task toward their targets, one runtime
//! operation at a time, and reports every observed transition.
//!
//! ## Loop
//! ```text
//! resync (inspect containers that have a runtime id)
//! loop {
//!   ├─► absorb queued runtime events and desired-status changes
//!   ├─► cancelled? ───────────────────────────────► exit (Cancelled)
//!   ├─► plan::next_action(task)
//!   │     ├─► Some(op) → run_with_retry(op) → transition → continue
//!   │     └─► None     → publish derived task status (forward only)
//!   ├─► task STOPPED? → remove containers → exit (Stopped)
//!   └─► wait: cancel | runtime event | desired change
//! }
//! ```
//!
//! ## Rules
//! - Known statuses only move forward; stale runtime events are ignored.
//! - An essential container reaching STOPPED or DEAD sets the task's desired
//!   status to STOPPED; the planner then tears every sibling down.
//! - Fatal failures and exhausted retries mark the container DEAD with the
//!   error as reason.
//! - Cancellation is honoured between operations, never inside one. A
//!   cancelled manager leaves containers as they are.
//! - The task data is only written here, in short critical sections that
//!   never span an await.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::core::plan::{self, Action, Op};
use crate::core::runner::{OpFailure, run_once, run_with_retry};
use crate::events::{Emitter, StateChangeEvent};
use crate::policies::RetryPolicy;
use crate::runtime::{ContainerSpec, RuntimeEvent, RuntimeRef};
use crate::tasks::{ContainerStatus, DesiredStatus, Task, TaskStatus};

/// Task data shared between its manager (writer) and readers.
pub(crate) type SharedTask = Arc<RwLock<Task>>;

/// Settings a manager takes from the engine configuration.
#[derive(Clone, Debug)]
pub(crate) struct ManagerParams {
    pub retry: RetryPolicy,
    pub op_timeout: Option<Duration>,
    pub remove_on_stop: bool,
}

/// Why a manager returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ManagerExit {
    /// Every container terminated; the task is frozen.
    Stopped,
    /// Engine disabled.
    Cancelled,
}

enum Wake {
    Cancelled,
    Runtime(Result<RuntimeEvent, broadcast::error::RecvError>),
    Desired(bool),
}

pub(crate) struct TaskManager {
    arn: String,
    task: SharedTask,
    runtime: RuntimeRef,
    emitter: Emitter,
    params: ManagerParams,
}

impl TaskManager {
    pub(crate) fn new(
        task: SharedTask,
        runtime: RuntimeRef,
        emitter: Emitter,
        params: ManagerParams,
    ) -> Self {
        let arn = task
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .arn()
            .to_string();
        Self {
            arn,
            task,
            runtime,
            emitter,
            params,
        }
    }

    fn read<R>(&self, f: impl FnOnce(&Task) -> R) -> R {
        f(&self.task.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write<R>(&self, f: impl FnOnce(&mut Task) -> R) -> R {
        f(&mut self.task.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// Runs until the task stops or `cancel` fires.
    pub(crate) async fn run(
        self,
        mut events: broadcast::Receiver<RuntimeEvent>,
        mut desired: watch::Receiver<DesiredStatus>,
        cancel: CancellationToken,
    ) -> ManagerExit {
        let mut published = self.read(Task::known_status);
        let mut events_open = true;
        let mut desired_open = true;
        tracing::debug!(task = %self.arn, status = %published, "task manager started");

        self.resync(&cancel).await;

        loop {
            self.absorb(&mut events, &mut desired, &cancel).await;
            if cancel.is_cancelled() {
                tracing::debug!(task = %self.arn, "task manager cancelled");
                return ManagerExit::Cancelled;
            }

            if let Some(action) = self.read(plan::next_action) {
                self.execute(action, &cancel).await;
                continue;
            }

            self.publish_task_status(&mut published, &cancel).await;
            if published == TaskStatus::Stopped {
                self.cleanup().await;
                tracing::info!(task = %self.arn, "task stopped");
                return ManagerExit::Stopped;
            }

            let wake = tokio::select! {
                biased;
                _ = cancel.cancelled() => Wake::Cancelled,
                ev = events.recv(), if events_open => Wake::Runtime(ev),
                res = desired.changed(), if desired_open => Wake::Desired(res.is_ok()),
            };
            match wake {
                Wake::Cancelled => {}
                Wake::Runtime(Ok(ev)) => self.on_runtime_event(ev, &cancel).await,
                Wake::Runtime(Err(broadcast::error::RecvError::Lagged(missed))) => {
                    tracing::warn!(task = %self.arn, missed, "runtime events lagged; resyncing");
                    self.resync(&cancel).await;
                }
                Wake::Runtime(Err(broadcast::error::RecvError::Closed)) => {
                    tracing::warn!(task = %self.arn, "runtime event feed closed");
                    events_open = false;
                }
                Wake::Desired(true) => self.apply_desired(&mut desired),
                Wake::Desired(false) => desired_open = false,
            }
        }
    }

    /// Applies everything that is already queued without waiting.
    async fn absorb(
        &self,
        events: &mut broadcast::Receiver<RuntimeEvent>,
        desired: &mut watch::Receiver<DesiredStatus>,
        cancel: &CancellationToken,
    ) {
        if desired.has_changed().unwrap_or(false) {
            self.apply_desired(desired);
        }
        loop {
            match events.try_recv() {
                Ok(ev) => self.on_runtime_event(ev, cancel).await,
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::warn!(task = %self.arn, missed, "runtime events lagged; resyncing");
                    self.resync(cancel).await;
                }
                Err(_) => break,
            }
        }
    }

    fn apply_desired(&self, desired: &mut watch::Receiver<DesiredStatus>) {
        let target = *desired.borrow_and_update();
        if target == DesiredStatus::Stopped && self.write(|t| t.request_stop("stop requested")) {
            tracing::info!(task = %self.arn, "stop requested");
        }
    }

    async fn on_runtime_event(&self, ev: RuntimeEvent, cancel: &CancellationToken) {
        let Some(idx) = self.read(|t| t.index_of_runtime_id(&ev.container_id)) else {
            return;
        };
        self.transition(idx, ev.status, ev.error, cancel).await;
    }

    /// Re-reads container state from the runtime.
    async fn resync(&self, cancel: &CancellationToken) {
        let known: Vec<(usize, String)> = self.read(|t| {
            t.containers()
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.is_terminal())
                .filter_map(|(idx, c)| c.runtime_id().map(|id| (idx, id.to_string())))
                .collect()
        });

        for (idx, id) in known {
            match run_once(self.runtime.inspect(&id), self.params.op_timeout).await {
                Ok(info) => match info.status {
                    Some(status) => self.transition(idx, status, info.error, cancel).await,
                    None => {
                        let reason = "container no longer exists in the runtime".to_string();
                        self.transition(idx, ContainerStatus::Stopped, Some(reason), cancel)
                            .await
                    }
                },
                Err(e) => {
                    tracing::warn!(task = %self.arn, container_id = %id, error = %e, "inspect failed");
                }
            }
        }
    }

    /// Records a forward transition and emits it. Stale statuses are dropped.
    async fn transition(
        &self,
        idx: usize,
        status: ContainerStatus,
        reason: Option<String>,
        cancel: &CancellationToken,
    ) {
        let ev = self.write(|t| {
            let c = t.container_mut(idx)?;
            if !c.advance(status, reason.clone()) {
                tracing::trace!(container = %c.name, %status, "ignoring non-advancing status");
                return None;
            }
            let name = c.name.clone();
            if c.essential && status.is_terminal() {
                let why = format!("essential container '{name}' is {status}");
                if t.request_stop(why) {
                    tracing::info!(container = %name, %status, "essential container terminated; stopping task");
                }
            }
            Some(StateChangeEvent::container(t.arn(), name, status).with_reason_opt(reason))
        });

        if let Some(ev) = ev {
            self.emitter.emit(ev, cancel).await;
        }
    }

    async fn execute(&self, action: Action, cancel: &CancellationToken) {
        let idx = action.idx;
        let Some((name, image, runtime_id, spec)) = self.read(|t| {
            t.containers().get(idx).map(|c| {
                let spec = ContainerSpec {
                    task_arn: t.arn().to_string(),
                    container_name: c.name.clone(),
                    image: c.image.clone(),
                    port_bindings: c.port_bindings.clone(),
                };
                (
                    c.name.clone(),
                    c.image.clone(),
                    c.runtime_id().map(str::to_string),
                    spec,
                )
            })
        }) else {
            return;
        };

        let rt = self.runtime.as_ref();
        let retry = &self.params.retry;
        let timeout = self.params.op_timeout;

        match action.op {
            Op::Pull => {
                let image = image.as_str();
                let res = run_with_retry("pull", &name, retry, timeout, cancel, move || {
                    rt.pull(image)
                })
                .await;
                self.settle(idx, res, ContainerStatus::Pulled, None, cancel)
                    .await;
            }
            Op::Create => {
                let spec = &spec;
                let res = run_with_retry("create", &name, retry, timeout, cancel, move || {
                    rt.create(spec)
                })
                .await;
                let res = res.map(|id| {
                    self.write(|t| {
                        if let Some(c) = t.container_mut(idx) {
                            c.runtime_id = Some(id);
                        }
                    })
                });
                self.settle(idx, res, ContainerStatus::Created, None, cancel)
                    .await;
            }
            Op::Start => {
                let Some(id) = runtime_id else {
                    let reason = "container has no runtime id".to_string();
                    self.transition(idx, ContainerStatus::Dead, Some(reason), cancel)
                        .await;
                    return;
                };
                let id = id.as_str();
                let res = run_with_retry("start", &name, retry, timeout, cancel, move || {
                    rt.start(id)
                })
                .await;
                self.settle(idx, res, ContainerStatus::Running, None, cancel)
                    .await;
            }
            Op::Stop => {
                let Some(id) = runtime_id else {
                    // Never created: nothing to stop in the runtime.
                    self.transition(idx, ContainerStatus::Stopped, action.reason, cancel)
                        .await;
                    return;
                };
                let id = id.as_str();
                let res = run_with_retry("stop", &name, retry, timeout, cancel, move || {
                    rt.stop(id)
                })
                .await;
                self.settle(idx, res, ContainerStatus::Stopped, action.reason, cancel)
                    .await;
            }
        }
    }

    /// Maps an operation outcome onto the container.
    async fn settle<T>(
        &self,
        idx: usize,
        res: Result<T, OpFailure>,
        on_success: ContainerStatus,
        reason: Option<String>,
        cancel: &CancellationToken,
    ) {
        match res {
            Ok(_) => self.transition(idx, on_success, reason, cancel).await,
            Err(OpFailure::Failed(e)) => {
                self.transition(idx, ContainerStatus::Dead, Some(e.to_string()), cancel)
                    .await
            }
            Err(OpFailure::Cancelled) => {}
        }
    }

    /// Publishes the derived task status if it moved forward.
    async fn publish_task_status(&self, published: &mut TaskStatus, cancel: &CancellationToken) {
        let (now, reason) = self.read(|t| (t.known_status(), t.stop_reason().map(str::to_string)));
        if now.rank() <= published.rank() {
            return;
        }
        *published = now;

        let mut ev = StateChangeEvent::task(&self.arn, now);
        if now == TaskStatus::Stopped {
            ev = ev.with_reason_opt(reason);
        }
        self.emitter.emit(ev, cancel).await;
    }

    /// Best-effort removal of every created container.
    async fn cleanup(&self) {
        if !self.params.remove_on_stop {
            return;
        }
        let ids: Vec<String> = self.read(|t| {
            t.containers()
                .iter()
                .filter_map(|c| c.runtime_id().map(str::to_string))
                .collect()
        });
        for id in ids {
            if let Err(e) = run_once(self.runtime.remove(&id), self.params.op_timeout).await {
                tracing::warn!(task = %self.arn, container_id = %id, error = %e, "container removal failed");
            }
        }
    }
}
