//! In-memory durable store for testing.

use crate::error::StorageResult;
use crate::store::DurableStore;
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory durable store.
///
/// This store keeps all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests that simulate a restart by sharing one store
///   between two engine instances
/// - Ephemeral queues that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use offsync_storage::{DurableStore, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// assert_eq!(store.get("missing").unwrap(), None);
/// store.set("k", "v").unwrap();
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with one value.
    ///
    /// Useful for testing recovery from corrupt data.
    #[must_use]
    pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        let store = Self::new();
        store.values.write().insert(key.into(), value.into());
        store
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl DurableStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.values.write().remove(key);
        Ok(())
    }
}
