//! Durable store trait definition.

use crate::error::StorageResult;

/// A string-keyed durable store.
///
/// Durable stores are **opaque string maps**. The sync engine serializes its
/// queue into a single value and reads it back at startup; stores never look
/// inside the values they hold.
///
/// # Invariants
///
/// - `get` returns exactly the value most recently passed to `set` for that key
/// - `set` overwrites any prior value
/// - A successful `set` survives process termination (for persistent stores)
/// - Stores must be `Send + Sync` for shared access
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
/// - [`UnavailableStore`] - For environments without storage
pub trait DurableStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// Returns `Ok(None)` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the value exists but cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any prior value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes the value stored under `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Returns false when the environment provides no durable storage.
    ///
    /// Callers treat reads and writes as no-ops in that case.
    fn is_available(&self) -> bool {
        true
    }
}

/// A store for environments without durable storage.
///
/// Reads always return nothing and writes are discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStore;

impl DurableStore for UnavailableStore {
    fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> StorageResult<()> {
        Ok(())
    }

    fn is_available(&self) -> bool {
        false
    }
}
