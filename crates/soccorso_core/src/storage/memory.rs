//! In-memory key-value store.
//!
//! Clones share the same underlying map, so several contexts in one process
//! can be handed the "same origin" storage. A byte quota and an availability
//! switch let tests reproduce quota-exceeded and storage-unavailable failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use super::KeyValueStore;
use crate::error::{Result, SoccorsoError};

/// In-memory, cloneable key-value store.
#[derive(Debug, Clone)]
pub struct MemoryKeyValueStore {
    items: Arc<RwLock<HashMap<String, String>>>,
    /// Maximum total size of keys and values, in bytes.
    quota: Option<usize>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryKeyValueStore {
    fn default() -> Self {
        Self {
            items: Arc::new(RwLock::new(HashMap::new())),
            quota: None,
            available: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl MemoryKeyValueStore {
    /// Create a new empty store with no quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty store limited to `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::default()
        }
    }

    /// Toggle availability. While unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SoccorsoError::StorageUnavailable(
                "in-memory store disabled".to_string(),
            ))
        }
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.check_available()?;
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());

        if let Some(quota) = self.quota {
            let others: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(SoccorsoError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.check_available()?;
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        items.remove(key);
        Ok(())
    }
}
