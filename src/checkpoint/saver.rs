//! # Snapshot storage boundary.
//!
//! The engine hands snapshots to a [`Saver`] supplied at construction time
//! ([`EngineBuilder::with_saver`](crate::EngineBuilder::with_saver)). Storage
//! format and location are the saver's business; failures are reported and
//! logged but never stop the engine.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::checkpoint::EngineSnapshot;
use crate::error::PersistenceError;

/// Durable storage for engine snapshots.
#[async_trait]
pub trait Saver: Send + Sync + 'static {
    /// Stores a snapshot, replacing the previous one.
    async fn save(&self, snapshot: &EngineSnapshot) -> Result<(), PersistenceError>;

    /// Returns the last stored snapshot, if any. Read once by `init`.
    async fn load(&self) -> Result<Option<EngineSnapshot>, PersistenceError> {
        Ok(None)
    }

    /// Whether snapshots survive the process (advertised as a capability).
    fn is_durable(&self) -> bool {
        true
    }
}

/// Discards every snapshot. Used when no saver is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSaver;

#[async_trait]
impl Saver for NoopSaver {
    async fn save(&self, _snapshot: &EngineSnapshot) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}

/// Keeps the latest snapshot as JSON in memory.
///
/// Share one instance between two engines (`Arc<MemorySaver>`) to carry
/// state from one to the next.
#[derive(Debug, Default)]
pub struct MemorySaver {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    json: Option<String>,
    saves: usize,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last stored snapshot, decoded.
    pub fn latest(&self) -> Option<EngineSnapshot> {
        let json = self.lock().json.clone()?;
        serde_json::from_str(&json).ok()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Saver for MemorySaver {
    async fn save(&self, snapshot: &EngineSnapshot) -> Result<(), PersistenceError> {
        let json = snapshot.to_json()?;
        let mut state = self.lock();
        state.json = Some(json);
        state.saves += 1;
        Ok(())
    }

    async fn load(&self) -> Result<Option<EngineSnapshot>, PersistenceError> {
        let Some(json) = self.lock().json.clone() else {
            return Ok(None);
        };
        EngineSnapshot::from_json(&json)
            .map(Some)
            .map_err(|e| PersistenceError::Load {
                error: e.to_string(),
            })
    }
}
