//! # Engine snapshot: the persisted form of the engine state.
//!
//! ```json
//! {
//!   "version": 1,
//!   "tasks": [
//!     { "id": "arn:web", "eniReferences": ["0a:58:a9:fe:ac:02"],
//!       "containers": [{ "name": "app", "image": "nginx", "knownStatus": "RUNNING", ... }] }
//!   ],
//!   "attachments": [
//!     { "mac": "0a:58:a9:fe:ac:02", "status": "ATTACHED", "expiresAt": 1718000000000,
//!       "owningTaskId": "arn:web" }
//!   ]
//! }
//! ```
//!
//! Unknown fields are ignored and missing collections default to empty, so
//! older engines read snapshots written by newer ones of the same version.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::attachments::{AttachmentStatus, EniAttachment};
use crate::error::{SnapshotError, ValidationError};
use crate::tasks::Task;

/// Highest snapshot format this engine reads (and the one it writes).
pub const SNAPSHOT_VERSION: u32 = 1;

/// Full exported state: every task with its containers' known statuses and
/// every ENI attachment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub version: u32,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub attachments: Vec<EniAttachment>,
}

impl EngineSnapshot {
    /// Snapshot at the current format version.
    pub fn new(tasks: Vec<Task>, attachments: Vec<EniAttachment>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            tasks,
            attachments,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes and checks the format version.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: EngineSnapshot = serde_json::from_str(json)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    pub(crate) fn check_version(&self) -> Result<(), SnapshotError> {
        if self.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(())
    }

    /// Structural checks applied before anything is restored.
    ///
    /// Beyond per-task validation, every MAC is referenced by at most one
    /// task and expired attachments are refused. An attached MAC must be owned
    /// by a task of the same snapshot, and no other task may reference it.
    pub(crate) fn validate(&self) -> Result<(), SnapshotError> {
        self.check_version()?;

        let mut ids = HashSet::new();
        let mut referenced: HashMap<&str, &str> = HashMap::new();
        for task in &self.tasks {
            task.validate()?;
            if !ids.insert(task.arn()) {
                return Err(ValidationError::DuplicateTask {
                    arn: task.arn().to_string(),
                }
                .into());
            }
            for mac in task.eni_references() {
                if let Some(owner) = referenced.insert(mac.as_str(), task.arn()) {
                    return Err(ValidationError::AttachmentClaimed {
                        mac: mac.clone(),
                        owner: owner.to_string(),
                    }
                    .into());
                }
            }
        }

        let mut macs = HashSet::new();
        for eni in &self.attachments {
            if !macs.insert(eni.mac()) {
                return Err(ValidationError::DuplicateAttachment {
                    mac: eni.mac().to_string(),
                }
                .into());
            }
            if eni.status() == AttachmentStatus::Expired {
                return Err(ValidationError::ExpiredAttachment {
                    mac: eni.mac().to_string(),
                }
                .into());
            }
            if let Some(owner) = eni.task_arn() {
                if !ids.contains(owner) {
                    return Err(ValidationError::UnknownTask {
                        arn: owner.to_string(),
                    }
                    .into());
                }
                if let Some(&holder) = referenced.get(eni.mac()) {
                    if holder != owner {
                        return Err(ValidationError::AttachmentClaimed {
                            mac: eni.mac().to_string(),
                            owner: owner.to_string(),
                        }
                        .into());
                    }
                }
            }
        }
        Ok(())
    }
}
