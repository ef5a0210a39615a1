//! # Broadcast bus for runtime events.
//!
//! The engine subscribes to the container runtime once and pumps every
//! [`RuntimeEvent`] into a [`Bus`]. Each task manager holds its own receiver
//! and ignores events for containers it does not own.
//!
//! ```text
//!   ContainerRuntime::subscribe ──► pump ──► Bus ──┬──► manager T1
//!                                                  ├──► manager T2
//!                                                  └──► manager TN
//! ```
//!
//! ## Rules
//! - `publish()` never blocks.
//! - A receiver that falls behind by more than `capacity` events observes
//!   `RecvError::Lagged(n)`; managers answer that by inspecting their
//!   containers instead of trusting the missed events.
//! - Events published while nobody listens are lost.

use tokio::sync::broadcast;

use crate::runtime::RuntimeEvent;

/// Cloneable handle over a `broadcast` channel of runtime events.
#[derive(Clone, Debug)]
pub(crate) struct Bus {
    tx: broadcast::Sender<RuntimeEvent>,
}

impl Bus {
    /// Capacity is clamped to at least 1.
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn publish(&self, ev: RuntimeEvent) {
        let _ = self.tx.send(ev);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.tx.subscribe()
    }
}
