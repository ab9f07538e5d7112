//! In-Memory Storage Implementation
//!
//! Provides in-memory storage for testing and one-shot sessions.
//! Data is lost when the process exits.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::traits::{KeyValueStore, StorageError, StorageResult};

/// In-memory key-value store
///
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
    /// When set, every operation fails (models disabled storage)
    disabled: bool,
}

impl MemoryKeyValueStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose every operation fails
    pub fn disabled() -> Self {
        Self {
            entries: Arc::default(),
            disabled: true,
        }
    }

    fn check_enabled(&self) -> StorageResult<()> {
        if self.disabled {
            return Err(StorageError::Unavailable("storage disabled".to_string()));
        }
        Ok(())
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.check_enabled()?;
        let entries = self
            .entries
            .read()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check_enabled()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        self.check_enabled()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(entries.remove(key).is_some())
    }
}
