//! # ENI attachment registry.
//!
//! Keyed by MAC address. Every pending entry owns an expiration timer (a
//! spawned task waiting on its own child token of the engine's root token):
//!
//! ```text
//! add ──► PENDING ──┬── claim (token cancelled) ──► ATTACHED  (event)
//!                   └── timer fires             ──► EXPIRED   (event, entry removed)
//! ```
//!
//! The map sits behind a std mutex that is never held across an await;
//! events are emitted after the lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::attachments::{AttachmentStatus, EniAttachment};
use crate::error::ValidationError;
use crate::events::{Emitter, StateChangeEvent};

struct Entry {
    attachment: EniAttachment,
    timer: Option<CancellationToken>,
}

pub(crate) struct AttachmentRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    emitter: Emitter,
    cancel: CancellationToken,
}

impl AttachmentRegistry {
    pub(crate) fn new(emitter: Emitter, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            emitter,
            cancel,
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a new attachment.
    ///
    /// With `claimant` set (a registered task already references the MAC) the
    /// attachment is claimed on the spot and the ATTACHED event is returned
    /// for publishing; otherwise its expiration timer starts.
    pub(crate) fn insert(
        self: &Arc<Self>,
        mut attachment: EniAttachment,
        claimant: Option<&str>,
    ) -> Result<Option<StateChangeEvent>, ValidationError> {
        let mac = attachment.mac().to_string();
        let mut entries = self.lock();
        if entries.contains_key(&mac) {
            return Err(ValidationError::DuplicateAttachment { mac });
        }
        let timer = match claimant {
            Some(arn) => {
                attachment.mark_attached(arn);
                None
            }
            None => Some(self.spawn_timer(&attachment)),
        };
        entries.insert(mac.clone(), Entry { attachment, timer });
        drop(entries);

        tracing::debug!(mac = %mac, claimant = claimant.unwrap_or("-"), "eni attachment added");
        Ok(claimant.map(|arn| Self::attached_event(&mac, arn)))
    }

    /// Claims every MAC a registering task references.
    ///
    /// All references are checked before any is claimed, so a conflict leaves
    /// the registry untouched. MACs not offered yet are skipped; they are
    /// claimed when they arrive. Returns the events to publish.
    pub(crate) fn claim_all(
        &self,
        macs: &[String],
        arn: &str,
    ) -> Result<Vec<StateChangeEvent>, ValidationError> {
        let mut entries = self.lock();
        for mac in macs {
            match entries.get(mac).and_then(|e| e.attachment.task_arn()) {
                Some(owner) if owner != arn => {
                    return Err(ValidationError::AttachmentClaimed {
                        mac: mac.clone(),
                        owner: owner.to_string(),
                    });
                }
                _ => {}
            }
        }

        let mut events = Vec::new();
        for mac in macs {
            let claimed = entries
                .get_mut(mac)
                .is_some_and(|entry| Self::claim_entry(entry, arn));
            if claimed {
                events.push(Self::attached_event(mac, arn));
            }
        }
        Ok(events)
    }

    /// Explicit claim of one attachment. Re-claiming by the owner is a no-op.
    pub(crate) async fn claim(&self, mac: &str, arn: &str) -> Result<(), ValidationError> {
        let claimed = {
            let mut entries = self.lock();
            let entry = entries
                .get_mut(mac)
                .ok_or_else(|| ValidationError::UnknownAttachment {
                    mac: mac.to_string(),
                })?;
            match entry.attachment.task_arn() {
                Some(owner) if owner != arn => {
                    return Err(ValidationError::AttachmentClaimed {
                        mac: mac.to_string(),
                        owner: owner.to_string(),
                    });
                }
                _ => {}
            }
            Self::claim_entry(entry, arn)
        };
        if claimed {
            self.emitter
                .emit(Self::attached_event(mac, arn), &self.cancel)
                .await;
        }
        Ok(())
    }

    /// Publishes events returned by [`claim_all`](Self::claim_all).
    pub(crate) async fn publish(&self, events: Vec<StateChangeEvent>) {
        for ev in events {
            self.emitter.emit(ev, &self.cancel).await;
        }
    }

    pub(crate) fn get(&self, mac: &str) -> Option<EniAttachment> {
        self.lock().get(mac).map(|e| e.attachment.clone())
    }

    /// Copies every entry, ordered by MAC.
    pub(crate) fn snapshot(&self) -> Vec<EniAttachment> {
        let mut out: Vec<_> = self.lock().values().map(|e| e.attachment.clone()).collect();
        out.sort_by(|a, b| a.mac().cmp(b.mac()));
        out
    }

    /// Reinstalls attachments from a snapshot. Pending entries get a fresh
    /// timer for whatever time they have left.
    ///
    /// Every MAC is checked against the live entries before any is inserted.
    pub(crate) fn restore_all(
        self: &Arc<Self>,
        attachments: Vec<EniAttachment>,
    ) -> Result<(), ValidationError> {
        let mut entries = self.lock();
        if let Some(dup) = attachments.iter().find(|a| entries.contains_key(a.mac())) {
            return Err(ValidationError::DuplicateAttachment {
                mac: dup.mac().to_string(),
            });
        }
        for attachment in attachments {
            let timer = (attachment.status() == AttachmentStatus::Pending)
                .then(|| self.spawn_timer(&attachment));
            entries.insert(attachment.mac().to_string(), Entry { attachment, timer });
        }
        Ok(())
    }

    fn claim_entry(entry: &mut Entry, arn: &str) -> bool {
        if entry.attachment.status() != AttachmentStatus::Pending {
            return false;
        }
        if let Some(timer) = entry.timer.take() {
            timer.cancel();
        }
        entry.attachment.mark_attached(arn);
        true
    }

    fn attached_event(mac: &str, arn: &str) -> StateChangeEvent {
        StateChangeEvent::attachment(mac, AttachmentStatus::Attached, Some(arn))
    }

    fn spawn_timer(self: &Arc<Self>, attachment: &EniAttachment) -> CancellationToken {
        let token = self.cancel.child_token();
        let wait = attachment.remaining();
        let mac = attachment.mac().to_string();
        let registry = Arc::clone(self);
        let t = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = t.cancelled() => {}
                _ = tokio::time::sleep(wait) => registry.expire(&mac).await,
            }
        });
        token
    }

    /// Timer callback: removes the entry if it is still pending.
    async fn expire(&self, mac: &str) {
        let expired = {
            let mut entries = self.lock();
            match entries.get(mac) {
                Some(e) if e.attachment.status() == AttachmentStatus::Pending => {
                    entries.remove(mac).map(|mut e| {
                        e.attachment.mark_expired();
                        e.attachment
                    })
                }
                _ => None,
            }
        };
        if let Some(attachment) = expired {
            tracing::info!(mac = %attachment.mac(), "eni attachment expired unclaimed");
            let ev = StateChangeEvent::attachment(mac, AttachmentStatus::Expired, None)
                .with_reason("expired before being claimed");
            self.emitter.emit(ev, &self.cancel).await;
        }
    }
}
