//! # Tracing mirror of state changes.
//!
//! [`LogWriter`] writes every forwarded event to `tracing`:
//!
//! ```text
//! INFO task state changed task=arn:web status=RUNNING
//! INFO container state changed task=arn:web container=app status=RUNNING
//! WARN container state changed task=arn:web container=app status=DEAD reason="bad image"
//! INFO eni attachment state changed mac=0a:58:a9:fe:ac:02 status=EXPIRED
//! ```
//!
//! Failures (`DEAD`, `EXPIRED`, anything carrying a reason) log at `WARN`.

use async_trait::async_trait;

use crate::events::{EventKind, StateChangeEvent, StatusChange};
use crate::subscribers::Subscribe;

/// Subscriber that logs events through `tracing`.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &StateChangeEvent) {
        let task = e.task_arn().unwrap_or("-");
        let reason = e.reason().unwrap_or("");
        let status = e.status().as_str();
        let failed = e.reason().is_some()
            || matches!(
                e.status(),
                StatusChange::Container(crate::ContainerStatus::Dead)
                    | StatusChange::Attachment(crate::AttachmentStatus::Expired)
            );

        match (e.kind(), failed) {
            (EventKind::Task, false) => tracing::info!(task, status, "task state changed"),
            (EventKind::Task, true) => tracing::warn!(task, status, reason, "task state changed"),
            (EventKind::Container, false) => tracing::info!(
                task,
                container = e.container_name().unwrap_or("-"),
                status,
                "container state changed"
            ),
            (EventKind::Container, true) => tracing::warn!(
                task,
                container = e.container_name().unwrap_or("-"),
                status,
                reason,
                "container state changed"
            ),
            (EventKind::Attachment, false) => tracing::info!(
                task,
                mac = e.mac().unwrap_or("-"),
                status,
                "eni attachment state changed"
            ),
            (EventKind::Attachment, true) => tracing::warn!(
                task,
                mac = e.mac().unwrap_or("-"),
                status,
                reason,
                "eni attachment state changed"
            ),
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
