//! # Task: a named group of containers reconciled together.
//!
//! A task's known status is never stored. It is derived from its containers
//! every time it is read:
//!
//! | containers                                         | task status |
//! |----------------------------------------------------|-------------|
//! | every container STOPPED or DEAD                    | `STOPPED`   |
//! | every essential container RUNNING                  | `RUNNING`   |
//! | no essential containers, every container RUNNING   | `RUNNING`   |
//! | anything else                                      | `CREATED`   |

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::tasks::container::Container;
use crate::tasks::status::{ContainerStatus, DesiredStatus, TaskStatus};

/// Declarative task plus the state its manager observed so far.
///
/// ## Example
/// ```
/// use taskengine::{Container, Task, TaskStatus};
///
/// let task = Task::new(
///     "arn:task/web",
///     vec![
///         Container::new("app", "nginx:1.27"),
///         Container::new("sidecar", "envoy:1.30").depends_on("app").essential(false),
///     ],
/// )
/// .with_eni_reference("0a:58:a9:fe:ac:02");
///
/// assert!(task.validate().is_ok());
/// assert_eq!(task.known_status(), TaskStatus::Created);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "id")]
    arn: String,
    containers: Vec<Container>,
    #[serde(default)]
    eni_references: Vec<String>,
    #[serde(default)]
    desired_status: DesiredStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stop_reason: Option<String>,
}

impl Task {
    /// Creates a task desired RUNNING.
    pub fn new(arn: impl Into<String>, containers: Vec<Container>) -> Self {
        Self {
            arn: arn.into(),
            containers,
            eni_references: Vec::new(),
            desired_status: DesiredStatus::Running,
            stop_reason: None,
        }
    }

    /// References an ENI attachment by MAC address.
    pub fn with_eni_reference(mut self, mac: impl Into<String>) -> Self {
        self.eni_references.push(mac.into());
        self
    }

    pub fn with_desired_status(mut self, status: DesiredStatus) -> Self {
        self.desired_status = status;
        self
    }

    pub fn arn(&self) -> &str {
        &self.arn
    }

    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    pub fn container(&self, name: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn eni_references(&self) -> &[String] {
        &self.eni_references
    }

    pub fn desired_status(&self) -> DesiredStatus {
        self.desired_status
    }

    /// Why the task was torn down (first essential failure or explicit stop).
    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    /// Derives the task status from its containers (see the module table).
    pub fn known_status(&self) -> TaskStatus {
        if self.containers.iter().all(Container::is_terminal) {
            return TaskStatus::Stopped;
        }

        let running = |c: &&Container| c.known_status == Some(ContainerStatus::Running);
        let mut essentials = self.containers.iter().filter(|c| c.essential).peekable();
        let all_running = if essentials.peek().is_some() {
            essentials.all(|c| running(&c))
        } else {
            self.containers.iter().all(|c| running(&c))
        };

        if all_running {
            TaskStatus::Running
        } else {
            TaskStatus::Created
        }
    }

    /// Checks the structural validity of the task definition.
    ///
    /// Rejects: empty identifier, no containers, empty or duplicate container
    /// names, missing images, dependencies on unknown containers and
    /// dependency cycles.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.arn.trim().is_empty() {
            return Err(ValidationError::EmptyIdentifier);
        }
        if self.containers.is_empty() {
            return Err(ValidationError::NoContainers {
                arn: self.arn.clone(),
            });
        }

        let mut names = HashSet::with_capacity(self.containers.len());
        for c in &self.containers {
            if c.name.trim().is_empty() {
                return Err(ValidationError::EmptyContainerName {
                    arn: self.arn.clone(),
                });
            }
            if !names.insert(c.name.as_str()) {
                return Err(ValidationError::DuplicateContainer {
                    container: c.name.clone(),
                });
            }
            if c.image.trim().is_empty() {
                return Err(ValidationError::MissingImage {
                    container: c.name.clone(),
                });
            }
        }

        for c in &self.containers {
            if let Some(dep) = c.dependencies.iter().find(|d| !names.contains(d.as_str())) {
                return Err(ValidationError::DanglingDependency {
                    container: c.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        self.check_acyclic()
    }

    /// Kahn's algorithm; whatever cannot be ordered sits on a cycle.
    fn check_acyclic(&self) -> Result<(), ValidationError> {
        let mut pending: HashMap<&str, usize> = self
            .containers
            .iter()
            .map(|c| (c.name.as_str(), c.dependencies.len()))
            .collect();
        let mut ready: VecDeque<&str> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut ordered = 0;
        while let Some(done) = ready.pop_front() {
            ordered += 1;
            for c in &self.containers {
                let edges = c.dependencies.iter().filter(|d| *d == done).count();
                if edges == 0 {
                    continue;
                }
                if let Some(n) = pending.get_mut(c.name.as_str()) {
                    *n -= edges;
                    if *n == 0 {
                        ready.push_back(c.name.as_str());
                    }
                }
            }
        }

        if ordered == self.containers.len() {
            return Ok(());
        }
        let stuck = self
            .containers
            .iter()
            .find(|c| pending.get(c.name.as_str()).is_some_and(|n| *n > 0));
        Err(ValidationError::DependencyCycle {
            container: stuck.map(|c| c.name.clone()).unwrap_or_default(),
        })
    }

    /// Target a container is driven toward: the stricter of the task's and
    /// the container's desired status.
    pub(crate) fn target_of(&self, idx: usize) -> DesiredStatus {
        self.containers
            .get(idx)
            .map(|c| self.desired_status.min(c.desired_status))
            .unwrap_or(DesiredStatus::Stopped)
    }

    pub(crate) fn index_of_runtime_id(&self, id: &str) -> Option<usize> {
        self.containers
            .iter()
            .position(|c| c.runtime_id.as_deref() == Some(id))
    }

    pub(crate) fn container_mut(&mut self, idx: usize) -> Option<&mut Container> {
        self.containers.get_mut(idx)
    }

    /// Moves the task's desired status to STOPPED, keeping the first reason.
    ///
    /// Returns `true` if the desired status changed.
    pub(crate) fn request_stop(&mut self, reason: impl Into<String>) -> bool {
        if self.desired_status == DesiredStatus::Stopped {
            return false;
        }
        self.desired_status = DesiredStatus::Stopped;
        if self.stop_reason.is_none() {
            self.stop_reason = Some(reason.into());
        }
        true
    }

    /// Clears the observed part of every container.
    ///
    /// Applied to incoming definitions so that callers cannot smuggle in
    /// runtime state through `AddTask`.
    pub(crate) fn reset_observed(&mut self) {
        self.stop_reason = None;
        for c in &mut self.containers {
            c.known_status = None;
            c.runtime_id = None;
            c.reason = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ContainerStatus::*;

    fn two_containers() -> Task {
        Task::new(
            "t",
            vec![
                Container::new("a", "img-a"),
                Container::new("b", "img-b").depends_on("a").essential(false),
            ],
        )
    }

    fn set(task: &mut Task, name: &str, status: ContainerStatus) {
        let idx = task.containers.iter().position(|c| c.name == name).unwrap();
        task.container_mut(idx).unwrap().known_status = Some(status);
    }

    #[test]
    fn test_running_when_essentials_run() {
        let mut t = two_containers();
        set(&mut t, "a", Running);
        set(&mut t, "b", Created);
        assert_eq!(t.known_status(), TaskStatus::Running);
    }

    #[test]
    fn test_terminal_essential_is_not_running() {
        let mut t = two_containers();
        set(&mut t, "a", Dead);
        set(&mut t, "b", Running);
        assert_eq!(t.known_status(), TaskStatus::Created);
        set(&mut t, "b", Stopped);
        assert_eq!(t.known_status(), TaskStatus::Stopped);
    }

    #[test]
    fn test_without_essentials_every_container_must_run() {
        let mut t = Task::new(
            "t",
            vec![
                Container::new("a", "x").essential(false),
                Container::new("b", "y").essential(false),
            ],
        );
        set(&mut t, "a", Running);
        assert_eq!(t.known_status(), TaskStatus::Created);
        set(&mut t, "b", Running);
        assert_eq!(t.known_status(), TaskStatus::Running);
    }

    #[test]
    fn test_validate_rejects_structural_errors() {
        let dup = Task::new("t", vec![Container::new("a", "x"), Container::new("a", "y")]);
        assert!(matches!(
            dup.validate(),
            Err(ValidationError::DuplicateContainer { .. })
        ));

        let dangling = Task::new("t", vec![Container::new("a", "x").depends_on("ghost")]);
        assert_eq!(
            dangling.validate(),
            Err(ValidationError::DanglingDependency {
                container: "a".into(),
                dependency: "ghost".into()
            })
        );

        assert_eq!(
            Task::new("", vec![Container::new("a", "x")]).validate(),
            Err(ValidationError::EmptyIdentifier)
        );
        assert!(matches!(
            Task::new("t", vec![]).validate(),
            Err(ValidationError::NoContainers { .. })
        ));
        assert!(matches!(
            Task::new("t", vec![Container::new("a", " ")]).validate(),
            Err(ValidationError::MissingImage { .. })
        ));
    }

    #[test]
    fn test_validate_detects_cycles() {
        let cycle = Task::new(
            "t",
            vec![
                Container::new("root", "x"),
                Container::new("a", "x").depends_on("b"),
                Container::new("b", "x").depends_on("a"),
            ],
        );
        assert_eq!(
            cycle.validate(),
            Err(ValidationError::DependencyCycle {
                container: "a".into()
            })
        );

        let own = Task::new("t", vec![Container::new("a", "x").depends_on("a")]);
        assert!(matches!(
            own.validate(),
            Err(ValidationError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn test_diamond_dependencies_are_acyclic() {
        let t = Task::new(
            "t",
            vec![
                Container::new("db", "x"),
                Container::new("cache", "x").depends_on("db"),
                Container::new("api", "x").depends_on("db").depends_on("cache"),
            ],
        );
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_target_takes_stricter_desired_status() {
        let t = Task::new(
            "t",
            vec![
                Container::new("a", "x"),
                Container::new("b", "x").with_desired_status(DesiredStatus::Created),
            ],
        );
        assert_eq!(t.target_of(0), DesiredStatus::Running);
        assert_eq!(t.target_of(1), DesiredStatus::Created);

        let mut stopped = t.clone();
        assert!(stopped.request_stop("operator"));
        assert!(!stopped.request_stop("again"));
        assert_eq!(stopped.target_of(0), DesiredStatus::Stopped);
        assert_eq!(stopped.stop_reason(), Some("operator"));
    }

    #[test]
    fn test_snapshot_field_names() {
        let json = serde_json::to_value(two_containers()).unwrap();
        assert_eq!(json["id"], "t");
        assert!(json["eniReferences"].is_array());
        assert_eq!(json["containers"][1]["dependencies"][0], "a");
    }
}
