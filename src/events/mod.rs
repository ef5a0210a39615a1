//! State-change events and how they travel.
//!
//! ## Contents
//! - [`StateChangeEvent`], [`EventKind`], [`StatusChange`] the event payload
//! - [`TaskEvents`] the two consumer streams (task-level, container-level)
//! - `Bus` broadcast of raw runtime events to every task manager
//! - `Dispatcher` / `Emitter` per-producer buffers and their forwarders
//!
//! ```text
//! runtime feed ──► Bus ──► TaskManager ──► Emitter ──► forwarder ──► TaskEvents
//!                                                          └──► SubscriberSet
//! ```

mod bus;
mod dispatcher;
mod event;

pub(crate) use bus::Bus;
pub(crate) use dispatcher::{Dispatcher, Emitter};
pub use dispatcher::TaskEvents;
pub use event::{EventKind, StateChangeEvent, StatusChange};
