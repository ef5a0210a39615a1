//! # State-change observers.
//!
//! ```text
//!   forwarder (per task) ── emit(&StateChangeEvent) ──► SubscriberSet
//!                                                          ├──► LogWriter (feature "logging")
//!                                                          └──► custom Subscribe impls
//! ```
//!
//! Subscribers see the same events as the consumer streams, in the same
//! per-task order, but can never slow a task down: their queues drop on
//! overflow.

#[cfg(feature = "logging")]
mod log;
mod subscribe;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
