//! # Lifecycle statuses for containers, tasks and attachments.
//!
//! Container known statuses move along a single forward path and never regress:
//!
//! ```text
//! (none) ─► PULLED ─► CREATED ─► RUNNING ─► STOPPED
//!                                      └──► DEAD
//! ```
//!
//! Any status may jump forward (a runtime event may report `STOPPED` for a
//! container the engine last saw as `CREATED`). `STOPPED` and `DEAD` share the
//! terminal rank: once one is reached, neither can replace it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Observed lifecycle status of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerStatus {
    /// Image is present on the host.
    Pulled,
    /// Container exists in the runtime but was not started.
    Created,
    /// Container is running.
    Running,
    /// Container exited or was stopped.
    Stopped,
    /// Container could not be realized (unrecoverable failure).
    Dead,
}

impl ContainerStatus {
    fn rank(self) -> u8 {
        match self {
            ContainerStatus::Pulled => 1,
            ContainerStatus::Created => 2,
            ContainerStatus::Running => 3,
            ContainerStatus::Stopped | ContainerStatus::Dead => 4,
        }
    }

    /// True for `STOPPED` and `DEAD`.
    pub fn is_terminal(self) -> bool {
        self.rank() == 4
    }

    /// True if `next` is strictly further along the lifecycle than `current`.
    ///
    /// ```
    /// use taskengine::ContainerStatus::*;
    /// use taskengine::ContainerStatus;
    ///
    /// assert!(ContainerStatus::advances(None, Pulled));
    /// assert!(ContainerStatus::advances(Some(Created), Stopped));
    /// assert!(!ContainerStatus::advances(Some(Running), Created));
    /// assert!(!ContainerStatus::advances(Some(Stopped), Dead));
    /// ```
    pub fn advances(current: Option<ContainerStatus>, next: ContainerStatus) -> bool {
        current.is_none_or(|c| next.rank() > c.rank())
    }

    /// True if `current` is at least as far along as `target`.
    pub fn reached(current: Option<ContainerStatus>, target: ContainerStatus) -> bool {
        current.is_some_and(|c| c.rank() >= target.rank())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContainerStatus::Pulled => "PULLED",
            ContainerStatus::Created => "CREATED",
            ContainerStatus::Running => "RUNNING",
            ContainerStatus::Stopped => "STOPPED",
            ContainerStatus::Dead => "DEAD",
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived status of a task (see [`Task::known_status`](crate::Task::known_status)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Containers are being prepared, or not every essential container runs.
    Created,
    /// Every essential container is running.
    Running,
    /// Every container reached a terminal status.
    Stopped,
}

impl TaskStatus {
    pub(crate) fn rank(self) -> u8 {
        match self {
            TaskStatus::Created => 0,
            TaskStatus::Running => 1,
            TaskStatus::Stopped => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Created => "CREATED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target status requested for a task or a single container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DesiredStatus {
    /// Pull and create, but do not start.
    Created,
    /// Run (default).
    #[default]
    Running,
    /// Tear down.
    Stopped,
}

impl DesiredStatus {
    /// The stricter of two targets (`STOPPED` beats `CREATED` beats `RUNNING`).
    pub(crate) fn min(self, other: DesiredStatus) -> DesiredStatus {
        use DesiredStatus::*;
        match (self, other) {
            (Stopped, _) | (_, Stopped) => Stopped,
            (Created, _) | (_, Created) => Created,
            _ => Running,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DesiredStatus::Created => "CREATED",
            DesiredStatus::Running => "RUNNING",
            DesiredStatus::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for DesiredStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::ContainerStatus::*;
    use super::*;

    #[test]
    fn test_terminal_statuses_never_replace_each_other() {
        assert!(!ContainerStatus::advances(Some(Stopped), Dead));
        assert!(!ContainerStatus::advances(Some(Dead), Stopped));
        assert!(Stopped.is_terminal() && Dead.is_terminal());
        assert!(!Running.is_terminal());
    }

    #[test]
    fn test_forward_jumps_are_allowed() {
        assert!(ContainerStatus::advances(None, Running));
        assert!(ContainerStatus::advances(Some(Pulled), Dead));
        assert!(!ContainerStatus::advances(Some(Created), Created));
    }

    #[test]
    fn test_reached_treats_terminal_as_past_running() {
        assert!(ContainerStatus::reached(Some(Stopped), Running));
        assert!(!ContainerStatus::reached(Some(Created), Running));
        assert!(!ContainerStatus::reached(None, Pulled));
    }

    #[test]
    fn test_desired_min_prefers_stricter_target() {
        use DesiredStatus as D;
        assert_eq!(D::Running.min(D::Created), D::Created);
        assert_eq!(D::Created.min(D::Stopped), D::Stopped);
        assert_eq!(D::Running.min(D::Running), D::Running);
    }

    #[test]
    fn test_serde_uses_upper_case_names() {
        let json = serde_json::to_string(&Running).unwrap();
        assert_eq!(json, "\"RUNNING\"");
        let back: TaskStatus = serde_json::from_str("\"STOPPED\"").unwrap();
        assert_eq!(back, TaskStatus::Stopped);
    }
}
