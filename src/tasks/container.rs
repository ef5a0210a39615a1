//! # Container definition and observed state.

use serde::{Deserialize, Serialize};

use crate::tasks::status::{ContainerStatus, DesiredStatus};

/// Port mapping passed through to the runtime untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortBinding {
    pub container_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

fn default_true() -> bool {
    true
}

impl PortBinding {
    pub fn tcp(container_port: u16, host_port: Option<u16>) -> Self {
        Self {
            container_port,
            host_port,
            protocol: default_protocol(),
        }
    }
}

/// One container of a [`Task`](crate::Task).
///
/// The declarative part (`name`, `image`, `dependencies`, `essential`,
/// `desired_status`, `port_bindings`) is supplied by the caller. The observed
/// part (known status, runtime id, failure reason) is owned by the task's
/// manager and only readable from outside.
///
/// ```
/// use taskengine::Container;
///
/// let sidecar = Container::new("log-router", "fluent-bit:2")
///     .depends_on("app")
///     .essential(false);
///
/// assert_eq!(sidecar.dependencies, vec!["app".to_string()]);
/// assert!(sidecar.known_status().is_none());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    /// Containers that must be RUNNING before this one starts.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Termination of an essential container stops the whole task.
    #[serde(default = "default_true")]
    pub essential: bool,
    #[serde(default)]
    pub desired_status: DesiredStatus,
    #[serde(default)]
    pub port_bindings: Vec<PortBinding>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) known_status: Option<ContainerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) runtime_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) reason: Option<String>,
}

impl Container {
    /// Essential container with no dependencies, desired RUNNING.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            dependencies: Vec::new(),
            essential: true,
            desired_status: DesiredStatus::Running,
            port_bindings: Vec::new(),
            known_status: None,
            runtime_id: None,
            reason: None,
        }
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    pub fn essential(mut self, essential: bool) -> Self {
        self.essential = essential;
        self
    }

    pub fn with_desired_status(mut self, status: DesiredStatus) -> Self {
        self.desired_status = status;
        self
    }

    pub fn with_port_binding(mut self, binding: PortBinding) -> Self {
        self.port_bindings.push(binding);
        self
    }

    /// Last observed status, `None` before the image was pulled.
    pub fn known_status(&self) -> Option<ContainerStatus> {
        self.known_status
    }

    /// Identifier assigned by the runtime on create.
    pub fn runtime_id(&self) -> Option<&str> {
        self.runtime_id.as_deref()
    }

    /// Why the container stopped or died, when known.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.known_status.is_some_and(ContainerStatus::is_terminal)
    }

    /// Moves the known status forward; returns `false` (and changes nothing)
    /// when `status` would not advance it.
    pub(crate) fn advance(&mut self, status: ContainerStatus, reason: Option<String>) -> bool {
        if !ContainerStatus::advances(self.known_status, status) {
            return false;
        }
        self.known_status = Some(status);
        if reason.is_some() {
            self.reason = reason;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_rejects_regression() {
        let mut c = Container::new("a", "busybox");
        assert!(c.advance(ContainerStatus::Running, None));
        assert!(!c.advance(ContainerStatus::Created, None));
        assert_eq!(c.known_status(), Some(ContainerStatus::Running));
    }

    #[test]
    fn test_advance_keeps_first_reason() {
        let mut c = Container::new("a", "busybox");
        assert!(c.advance(ContainerStatus::Dead, Some("bad image".into())));
        assert!(!c.advance(ContainerStatus::Stopped, Some("later".into())));
        assert_eq!(c.reason(), Some("bad image"));
    }

    #[test]
    fn test_defaults_when_deserializing_minimal_json() {
        let c: Container = serde_json::from_str(r#"{"name":"a","image":"nginx"}"#).unwrap();
        assert!(c.essential);
        assert_eq!(c.desired_status, DesiredStatus::Running);
        assert!(c.dependencies.is_empty());
        assert!(c.known_status().is_none());
    }
}
