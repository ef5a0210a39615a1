//! # Event dispatcher: per-task buffers fanned into two output streams.
//!
//! ```text
//!   manager T1 ─► [task buffer T1] ─► forwarder T1 ─┐
//!   manager T2 ─► [task buffer T2] ─► forwarder T2 ─┼──► tasks stream      (Task, Attachment)
//!   ENI registry ► [buffer]        ─► forwarder    ─┘──► containers stream (Container)
//!                                         │
//!                                         ├──► SubscriberSet::emit (non-blocking)
//!                                         └──► checkpoint request
//! ```
//!
//! ## Rules
//! - One bounded buffer and one forwarder per producer. A full output stream
//!   blocks only the forwarder that is writing, so only that producer's
//!   buffer fills and only that producer waits.
//! - A forwarder preserves its producer's order. Nothing orders events of
//!   different producers.
//! - [`Dispatcher::close`] tells forwarders to flush what is already buffered
//!   without waiting, then drops every output sender. Consumers read the
//!   remaining buffered events and then observe end of stream.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::CheckpointTrigger;
use crate::events::StateChangeEvent;
use crate::subscribers::SubscriberSet;

/// The two consumer-facing streams returned by
/// [`TaskEngine::task_events`](crate::TaskEngine::task_events).
///
/// Both end (`recv()` returns `None`) after the engine is disabled and the
/// remaining events were read.
#[derive(Debug)]
pub struct TaskEvents {
    /// Task-level and ENI attachment events.
    pub tasks: mpsc::Receiver<StateChangeEvent>,
    /// Container-level events.
    pub containers: mpsc::Receiver<StateChangeEvent>,
}

#[derive(Clone)]
struct Outputs {
    tasks: mpsc::Sender<StateChangeEvent>,
    containers: mpsc::Sender<StateChangeEvent>,
}

impl Outputs {
    fn route(&self, ev: &StateChangeEvent) -> &mpsc::Sender<StateChangeEvent> {
        if ev.is_task_level() {
            &self.tasks
        } else {
            &self.containers
        }
    }
}

/// Producer side of one bounded task buffer.
#[derive(Clone, Debug)]
pub(crate) struct Emitter {
    tx: mpsc::Sender<StateChangeEvent>,
}

impl Emitter {
    /// Pushes an event into the buffer, waiting while it is full.
    ///
    /// Once `cancel` fires the event is offered without waiting and dropped
    /// if the buffer is still full, so a cancelled producer never hangs on a
    /// consumer that stopped reading.
    pub(crate) async fn emit(&self, ev: StateChangeEvent, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            self.offer(ev);
            return;
        }
        let permit = tokio::select! {
            biased;
            p = self.tx.reserve() => p,
            _ = cancel.cancelled() => {
                self.offer(ev);
                return;
            }
        };
        if let Ok(permit) = permit {
            permit.send(ev);
        }
    }

    fn offer(&self, ev: StateChangeEvent) {
        if let Err(mpsc::error::TrySendError::Full(ev)) = self.tx.try_send(ev) {
            tracing::warn!(seq = ev.seq(), task = ev.task_arn().unwrap_or("-"), "event dropped during shutdown");
        }
    }
}

pub(crate) struct Dispatcher {
    outputs: Mutex<Option<Outputs>>,
    streams: Mutex<Option<TaskEvents>>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
    closing: CancellationToken,
    subs: Arc<SubscriberSet>,
    checkpoint: CheckpointTrigger,
    task_buffer: usize,
}

impl Dispatcher {
    pub(crate) fn new(
        stream_capacity: usize,
        task_buffer: usize,
        subs: Arc<SubscriberSet>,
        checkpoint: CheckpointTrigger,
    ) -> Self {
        let (tasks_tx, tasks_rx) = mpsc::channel(stream_capacity.max(1));
        let (containers_tx, containers_rx) = mpsc::channel(stream_capacity.max(1));
        Self {
            outputs: Mutex::new(Some(Outputs {
                tasks: tasks_tx,
                containers: containers_tx,
            })),
            streams: Mutex::new(Some(TaskEvents {
                tasks: tasks_rx,
                containers: containers_rx,
            })),
            forwarders: Mutex::new(Vec::new()),
            closing: CancellationToken::new(),
            subs,
            checkpoint,
            task_buffer: task_buffer.max(1),
        }
    }

    /// Hands out the output streams; `None` on every call after the first.
    pub(crate) fn take_streams(&self) -> Option<TaskEvents> {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Creates a bounded buffer for one producer and spawns its forwarder.
    ///
    /// After [`close`](Self::close) the returned emitter discards everything.
    pub(crate) fn emitter(&self, producer: &str) -> Emitter {
        let (tx, rx) = mpsc::channel(self.task_buffer);
        let outputs = self
            .outputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if let Some(outputs) = outputs {
            let fwd = Forwarder {
                producer: producer.to_string(),
                rx,
                outputs,
                closing: self.closing.clone(),
                subs: Arc::clone(&self.subs),
                checkpoint: self.checkpoint.clone(),
            };
            let mut forwarders = self
                .forwarders
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            forwarders.retain(|h| !h.is_finished());
            forwarders.push(tokio::spawn(fwd.run()));
        }
        Emitter { tx }
    }

    /// Flushes buffered events and closes the output streams.
    ///
    /// Waits up to `grace` for forwarders; stragglers are aborted.
    pub(crate) async fn close(&self, grace: Duration) {
        self.closing.cancel();
        self.outputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let forwarders: Vec<_> = self
            .forwarders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let aborts: Vec<_> = forwarders.iter().map(|h| h.abort_handle()).collect();
        let joined = tokio::time::timeout(grace, futures::future::join_all(forwarders)).await;
        if joined.is_err() {
            tracing::warn!(stuck = aborts.len(), "event forwarders exceeded grace; aborting");
            for a in aborts {
                a.abort();
            }
        }
    }
}

struct Forwarder {
    producer: String,
    rx: mpsc::Receiver<StateChangeEvent>,
    outputs: Outputs,
    closing: CancellationToken,
    subs: Arc<SubscriberSet>,
    checkpoint: CheckpointTrigger,
}

impl Forwarder {
    async fn run(mut self) {
        loop {
            let ev = tokio::select! {
                biased;
                _ = self.closing.cancelled() => break,
                ev = self.rx.recv() => match ev {
                    Some(ev) => ev,
                    None => return,
                },
            };

            self.subs.emit(&ev);
            let tx = self.outputs.route(&ev).clone();
            tokio::select! {
                biased;
                res = tx.send(ev.clone()) => {
                    if res.is_err() {
                        tracing::debug!(producer = %self.producer, "event stream receiver dropped");
                    }
                }
                _ = self.closing.cancelled() => {
                    self.deliver_now(ev);
                    break;
                }
            }
            self.checkpoint.request();
        }
        self.drain();
    }

    /// Non-blocking delivery used while closing.
    fn deliver_now(&self, ev: StateChangeEvent) {
        if let Err(mpsc::error::TrySendError::Full(ev)) = self.outputs.route(&ev).try_send(ev) {
            tracing::warn!(producer = %self.producer, seq = ev.seq(), "output stream full at shutdown; event dropped");
        }
    }

    fn drain(&mut self) {
        self.rx.close();
        while let Ok(ev) = self.rx.try_recv() {
            self.subs.emit(&ev);
            self.deliver_now(ev);
        }
        self.checkpoint.request();
    }
}
