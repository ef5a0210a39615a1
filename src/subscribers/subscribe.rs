//! # Observer hook for state changes.
//!
//! `Subscribe` lets embedders observe every [`StateChangeEvent`] the engine
//! forwards, independently of the two consumer streams handed out by
//! [`TaskEngine::task_events`](crate::TaskEngine::task_events). Each subscriber
//! runs on its own worker behind a bounded queue owned by the
//! [`SubscriberSet`](crate::subscribers::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow; they never block a task manager or other
//!   subscribers.
//! - On queue overflow the event is dropped for that subscriber only (warn).
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use taskengine::{StateChangeEvent, Subscribe};
//!
//! struct Audit;
//!
//! #[async_trait]
//! impl Subscribe for Audit {
//!     async fn on_event(&self, ev: &StateChangeEvent) {
//!         let _ = ev.task_arn();
//!     }
//!     fn name(&self) -> &'static str { "audit" }
//!     fn queue_capacity(&self) -> usize { 512 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::StateChangeEvent;

/// Contract for state-change observers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &StateChangeEvent);

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue (min 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
