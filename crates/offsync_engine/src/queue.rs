//! Durable storage of the pending-operation queue.

use crate::backend::Payload;
use crate::error::SyncResult;
use offsync_protocol::{decode_queue, encode_queue, QueuedOperation};
use offsync_storage::DurableStore;
use std::marker::PhantomData;
use std::sync::Arc;

/// Reads and writes the queue as a single value in a [`DurableStore`].
///
/// Every write replaces the whole queue. When the store reports itself
/// unavailable, loads return an empty queue and writes are skipped.
pub struct SyncQueueStore<P> {
    store: Arc<dyn DurableStore>,
    key: String,
    _payload: PhantomData<fn() -> P>,
}

impl<P: Payload> SyncQueueStore<P> {
    /// Creates a queue store persisting under `key`.
    pub fn new(store: Arc<dyn DurableStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            _payload: PhantomData,
        }
    }

    /// Returns the storage key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns true if writes survive a restart.
    pub fn is_durable(&self) -> bool {
        self.store.is_available()
    }

    /// Reads the persisted queue, reporting read and decode failures.
    pub fn try_load(&self) -> SyncResult<Vec<QueuedOperation<P>>> {
        if !self.store.is_available() {
            return Ok(Vec::new());
        }
        match self.store.get(&self.key)? {
            Some(data) => Ok(decode_queue(&data)?),
            None => Ok(Vec::new()),
        }
    }

    /// Reads the persisted queue.
    ///
    /// A missing, unreadable or corrupt queue loads as empty; the failure is
    /// logged and never returned, so a damaged store cannot stop startup.
    pub fn load(&self) -> Vec<QueuedOperation<P>> {
        match self.try_load() {
            Ok(operations) => {
                tracing::debug!(key = %self.key, pending = operations.len(), "loaded sync queue");
                operations
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "discarding unreadable sync queue");
                Vec::new()
            }
        }
    }

    /// Overwrites the persisted queue with `operations`.
    pub fn persist(&self, operations: &[QueuedOperation<P>]) -> SyncResult<()> {
        if !self.store.is_available() {
            return Ok(());
        }
        let data = encode_queue(operations)?;
        self.store.set(&self.key, &data)?;
        Ok(())
    }

    /// Removes the persisted queue.
    pub fn clear(&self) -> SyncResult<()> {
        if !self.store.is_available() {
            return Ok(());
        }
        self.store.remove(&self.key)?;
        Ok(())
    }
}
