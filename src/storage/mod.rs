//! Persistent key-value backends.
//!
//! The credential layer only needs local-storage semantics: short string keys
//! mapping to string values, read and written synchronously. Anything that can
//! offer that implements [`KeyValueStore`].

use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

mod sqlite;

pub use sqlite::SqliteStore;

/// Synchronous string key-value surface.
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value, or `None` if the key was never written or was removed.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Inserts or replaces the value for `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("at").unwrap().is_none());

        store.set("at", "value").unwrap();
        assert_eq!(store.get("at").unwrap().as_deref(), Some("value"));

        store.set("at", "replaced").unwrap();
        assert_eq!(store.get("at").unwrap().as_deref(), Some("replaced"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_store_remove_is_idempotent() {
        let store = MemoryStore::new();
        store.set("rt", "value").unwrap();

        store.remove("rt").unwrap();
        store.remove("rt").unwrap();

        assert!(store.get("rt").unwrap().is_none());
        assert!(store.is_empty());
    }
}
