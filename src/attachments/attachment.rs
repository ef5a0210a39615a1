//! # ENI attachment record.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lifecycle of an offered attachment.
///
/// ```text
/// PENDING ──claim──► ATTACHED
///    └────timeout──► EXPIRED (entry removed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttachmentStatus {
    Pending,
    Attached,
    Expired,
}

impl AttachmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentStatus::Pending => "PENDING",
            AttachmentStatus::Attached => "ATTACHED",
            AttachmentStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for AttachmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A network interface offered to a task, keyed by MAC address.
///
/// ```
/// use std::time::Duration;
/// use taskengine::{AttachmentStatus, EniAttachment};
///
/// let eni = EniAttachment::new("0a:58:a9:fe:ac:02", Duration::from_secs(30));
/// assert_eq!(eni.status(), AttachmentStatus::Pending);
/// assert!(eni.task_arn().is_none());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EniAttachment {
    mac: String,
    status: AttachmentStatus,
    #[serde(with = "unix_millis")]
    expires_at: SystemTime,
    #[serde(
        rename = "owningTaskId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    task_arn: Option<String>,
}

impl EniAttachment {
    /// Pending attachment that expires `ttl` from now unless claimed.
    pub fn new(mac: impl Into<String>, ttl: Duration) -> Self {
        Self::with_deadline(mac, deadline_after(SystemTime::now(), ttl))
    }

    /// Pending attachment with an absolute deadline.
    pub fn with_deadline(mac: impl Into<String>, expires_at: SystemTime) -> Self {
        Self {
            mac: mac.into(),
            status: AttachmentStatus::Pending,
            expires_at,
            task_arn: None,
        }
    }

    pub fn mac(&self) -> &str {
        &self.mac
    }

    pub fn status(&self) -> AttachmentStatus {
        self.status
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// Owning task, set once claimed.
    pub fn task_arn(&self) -> Option<&str> {
        self.task_arn.as_deref()
    }

    /// Time left before expiry, zero once the deadline passed.
    pub(crate) fn remaining(&self) -> Duration {
        self.expires_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }

    pub(crate) fn mark_attached(&mut self, arn: &str) {
        self.status = AttachmentStatus::Attached;
        self.task_arn = Some(arn.to_string());
    }

    pub(crate) fn mark_expired(&mut self) {
        self.status = AttachmentStatus::Expired;
    }
}

/// Latest deadline handed out when `ttl` does not fit in a `SystemTime`.
const FAR_FUTURE: Duration = Duration::from_secs(u32::MAX as u64);

fn deadline_after(base: SystemTime, ttl: Duration) -> SystemTime {
    base.checked_add(ttl)
        .unwrap_or_else(|| UNIX_EPOCH + FAR_FUTURE)
}

/// `SystemTime` as milliseconds since the unix epoch.
mod unix_millis {
    use super::*;

    pub fn serialize<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
        let ms = t
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        s.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SystemTime, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(deadline_after(UNIX_EPOCH, Duration::from_millis(ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_serializes_as_unix_millis() {
        let eni = EniAttachment::with_deadline("m", UNIX_EPOCH + Duration::from_millis(1_700));
        let json = serde_json::to_value(&eni).unwrap();
        assert_eq!(json["expiresAt"], 1_700);
        assert_eq!(json["status"], "PENDING");
        assert!(json.get("owningTaskId").is_none());

        let back: EniAttachment = serde_json::from_value(json).unwrap();
        assert_eq!(back, eni);
    }

    #[test]
    fn test_past_deadline_has_no_time_left() {
        let eni = EniAttachment::with_deadline("m", UNIX_EPOCH);
        assert_eq!(eni.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_huge_ttl_saturates_to_far_future() {
        let eni = EniAttachment::new("m", Duration::MAX);
        assert_eq!(eni.status(), AttachmentStatus::Pending);
        assert!(eni.remaining() > Duration::from_secs(3600));

        let json = serde_json::to_value(&eni).unwrap();
        let back: EniAttachment = serde_json::from_value(json).unwrap();
        assert_eq!(back.status(), AttachmentStatus::Pending);
    }
}
