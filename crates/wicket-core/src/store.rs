// State store abstraction: one whole-object read and one whole-object write
// of the auction blob.

use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::draw::persisted::PersistedAuction;
use crate::draw::AuctionState;

/// Durable home for the auction state. Implementations store the JSON blob
/// produced by [`PersistedAuction`] verbatim. The event loop holds its store
/// across awaits, so implementations must be shareable between threads.
pub trait StateStore: Send + Sync {
    /// Read the raw blob, if one was saved.
    fn load_blob(&self) -> Result<Option<String>>;

    /// Replace the saved blob.
    fn save_blob(&self, json: &str) -> Result<()>;

    /// Forget the saved blob.
    fn clear(&self) -> Result<()>;

    /// When the blob was last written, if the store records it.
    fn saved_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(None)
    }

    /// Load the saved state. A missing or unparseable blob is reported as
    /// `None`; only storage failures are errors.
    fn load(&self) -> Result<Option<AuctionState>> {
        let Some(json) = self.load_blob()? else {
            return Ok(None);
        };
        match PersistedAuction::from_json(&json) {
            Ok(blob) => Ok(Some(blob.into())),
            Err(e) => {
                warn!("Discarding corrupt auction state: {}", e);
                Ok(None)
            }
        }
    }

    fn save(&self, state: &AuctionState) -> Result<()> {
        let json = PersistedAuction::from(state)
            .to_json()
            .context("failed to serialize auction state")?;
        self.save_blob(&json)
    }
}

/// Process-local store. Holds the serialized blob so the JSON round trip is
/// still exercised.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blob: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an arbitrary blob (e.g. a hand-written one).
    pub fn with_blob(json: impl Into<String>) -> Self {
        MemoryStore {
            blob: Mutex::new(Some(json.into())),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.blob.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateStore for MemoryStore {
    fn load_blob(&self) -> Result<Option<String>> {
        Ok(self.slot().clone())
    }

    fn save_blob(&self, json: &str) -> Result<()> {
        *self.slot() = Some(json.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::{Identifier, Phase};

    fn assert_shareable<S: Send + Sync>() {}

    #[test]
    fn stores_are_shareable_between_threads() {
        assert_shareable::<MemoryStore>();
        assert_shareable::<Box<dyn StateStore>>();
    }

    #[test]
    fn memory_store_has_no_timestamp() {
        let store = MemoryStore::new();
        store.save(&AuctionState::default()).unwrap();
        assert!(store.saved_at().unwrap().is_none());
    }

    #[test]
    fn empty_store_loads_none() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = MemoryStore::new();
        let state = AuctionState {
            phase: Phase::Main,
            main_pool: vec![Identifier::new(2).unwrap()],
            current_id: Identifier::new(1),
            pending_animation: true,
            ..Default::default()
        };
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), Some(state));
    }

    #[test]
    fn corrupt_blob_loads_none() {
        let store = MemoryStore::with_blob("<<garbage>>");
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn clear_forgets_state() {
        let store = MemoryStore::new();
        store.save(&AuctionState::default()).unwrap();
        store.clear().unwrap();
        assert!(store.load_blob().unwrap().is_none());
    }
}
