//! # ENI attachments offered to tasks.
//!
//! - [`EniAttachment`], [`AttachmentStatus`] the record and its lifecycle
//! - `AttachmentRegistry` claim bookkeeping and expiration timers

mod attachment;
mod registry;

pub use attachment::{AttachmentStatus, EniAttachment};
pub(crate) use registry::AttachmentRegistry;
