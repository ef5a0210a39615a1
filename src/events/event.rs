//! # State-change events.
//!
//! A [`StateChangeEvent`] records one observed transition. It is tagged by
//! [`EventKind`]:
//! - **Task**: the derived task status changed
//! - **Container**: a container's known status advanced
//! - **Attachment**: an ENI attachment was claimed or expired
//!
//! Task and attachment events travel on the task-level stream, container
//! events on the container-level stream.
//!
//! ## Ordering
//! `seq` is a process-wide, monotonically increasing sequence number. Within
//! one task, delivery order equals `seq` order.
//!
//! ## Example
//! ```rust
//! use taskengine::{ContainerStatus, EventKind, StateChangeEvent};
//!
//! let ev = StateChangeEvent::container("arn:web", "app", ContainerStatus::Dead)
//!     .with_reason("invalid reference format");
//!
//! assert_eq!(ev.kind(), EventKind::Container);
//! assert_eq!(ev.container_status(), Some(ContainerStatus::Dead));
//! assert_eq!(ev.reason(), Some("invalid reference format"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use serde::Serialize;

use crate::attachments::AttachmentStatus;
use crate::tasks::{ContainerStatus, TaskStatus};

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Which stream an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Task,
    Container,
    Attachment,
}

/// New status carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StatusChange {
    Task(TaskStatus),
    Container(ContainerStatus),
    Attachment(AttachmentStatus),
}

impl StatusChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusChange::Task(s) => s.as_str(),
            StatusChange::Container(s) => s.as_str(),
            StatusChange::Attachment(s) => s.as_str(),
        }
    }
}

/// Immutable record of one transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangeEvent {
    seq: u64,
    at: SystemTime,
    kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mac: Option<String>,
    status: StatusChange,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl StateChangeEvent {
    fn new(kind: EventKind, status: StatusChange) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task_arn: None,
            container: None,
            mac: None,
            status,
            reason: None,
        }
    }

    /// Derived task status changed.
    pub fn task(arn: impl Into<String>, status: TaskStatus) -> Self {
        let mut ev = Self::new(EventKind::Task, StatusChange::Task(status));
        ev.task_arn = Some(arn.into());
        ev
    }

    /// Container known status advanced.
    pub fn container(
        arn: impl Into<String>,
        container: impl Into<String>,
        status: ContainerStatus,
    ) -> Self {
        let mut ev = Self::new(EventKind::Container, StatusChange::Container(status));
        ev.task_arn = Some(arn.into());
        ev.container = Some(container.into());
        ev
    }

    /// ENI attachment claimed or expired. `owner` is set once claimed.
    pub fn attachment(mac: impl Into<String>, status: AttachmentStatus, owner: Option<&str>) -> Self {
        let mut ev = Self::new(EventKind::Attachment, StatusChange::Attachment(status));
        ev.mac = Some(mac.into());
        ev.task_arn = owner.map(str::to_string);
        ev
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub(crate) fn with_reason_opt(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn at(&self) -> SystemTime {
        self.at
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn task_arn(&self) -> Option<&str> {
        self.task_arn.as_deref()
    }

    pub fn container_name(&self) -> Option<&str> {
        self.container.as_deref()
    }

    pub fn mac(&self) -> Option<&str> {
        self.mac.as_deref()
    }

    pub fn status(&self) -> StatusChange {
        self.status
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn task_status(&self) -> Option<TaskStatus> {
        match self.status {
            StatusChange::Task(s) => Some(s),
            _ => None,
        }
    }

    pub fn container_status(&self) -> Option<ContainerStatus> {
        match self.status {
            StatusChange::Container(s) => Some(s),
            _ => None,
        }
    }

    pub fn attachment_status(&self) -> Option<AttachmentStatus> {
        match self.status {
            StatusChange::Attachment(s) => Some(s),
            _ => None,
        }
    }

    /// True for events routed to the task-level stream.
    pub(crate) fn is_task_level(&self) -> bool {
        !matches!(self.kind, EventKind::Container)
    }
}
