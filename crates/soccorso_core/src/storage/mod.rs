//! Durable storage for the shared state.
//!
//! This module defines the [`KeyValueStore`] trait, a synchronous per-origin
//! key-value store shared by every context, and the [`DurableStore`] adapter
//! that reads and writes the single serialized snapshot under one fixed key.
//!
//! # Storage Model
//!
//! The whole state tree is written as one JSON document, never partially:
//!
//! ```json
//! {"version":1,"state":{"selectedRegion":"veneto","selectedDispatchCenter":null}}
//! ```
//!
//! Writes from different contexts are last-writer-wins, with no locking and
//! no transactions.

mod memory;
pub use memory::MemoryKeyValueStore;

#[cfg(not(target_arch = "wasm32"))]
mod file;
#[cfg(not(target_arch = "wasm32"))]
pub use file::FileKeyValueStore;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SoccorsoError};
use crate::state::SharedState;

/// A persistent, synchronous key-value store shared by all contexts of an origin.
///
/// Implementations must be cheap to call from the dispatch path: every
/// state-changing action ends in at most one `set_item`.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key is absent.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// The document persisted under the store key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    /// Version of the snapshot format
    pub version: u32,
    /// The full state tree
    pub state: SharedState,
}

impl PersistedSnapshot {
    /// Current snapshot format version
    pub const CURRENT_VERSION: u32 = 1;

    /// Wrap a state in a current-version snapshot.
    pub fn new(state: SharedState) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            state,
        }
    }

    /// Serialize to the stored JSON text.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse stored JSON text, rejecting unknown versions.
    pub fn from_json(raw: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(raw)?;
        if snapshot.version != Self::CURRENT_VERSION {
            return Err(SoccorsoError::UnsupportedSnapshotVersion(snapshot.version));
        }
        Ok(snapshot)
    }
}

/// Reads and writes the shared state snapshot under a single key.
pub struct DurableStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl DurableStore {
    /// Bind the adapter to `key` in `kv`.
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
        }
    }

    /// The store key this adapter reads and writes.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Persist `state` as the current snapshot.
    ///
    /// Callers on the dispatch path log and ignore the error.
    pub fn save(&self, state: &SharedState) -> Result<()> {
        let raw = PersistedSnapshot::new(state.clone()).to_json()?;
        self.kv.set_item(&self.key, &raw)
    }

    /// Load the persisted state.
    ///
    /// Missing, unreadable, corrupt and unknown-version snapshots all return
    /// `None`: the context starts empty instead of failing.
    pub fn load(&self) -> Option<SharedState> {
        let raw = match self.kv.get_item(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                log::debug!("no persisted snapshot under '{}'", self.key);
                return None;
            }
            Err(e) => {
                log::warn!("could not read persisted snapshot '{}': {}", self.key, e);
                return None;
            }
        };

        match PersistedSnapshot::from_json(&raw) {
            Ok(snapshot) => Some(snapshot.state),
            Err(e) => {
                log::warn!("ignoring corrupt snapshot under '{}': {}", self.key, e);
                None
            }
        }
    }

    /// Remove the snapshot entirely.
    pub fn clear(&self) -> Result<()> {
        self.kv.remove_item(&self.key)
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
