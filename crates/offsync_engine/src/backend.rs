//! Data backend abstraction for replaying queued operations.

use crate::error::{SyncError, SyncResult};
use offsync_protocol::{OperationKind, ProtocolError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Bounds required of a queued payload type.
///
/// Blanket-implemented for every type that satisfies them.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// The host application's data backend.
///
/// This trait is how the engine applies a mutation to the backing service,
/// both when replaying the queue and for immediate attempts made through
/// [`crate::OfflineMutation`]. What "apply" means per collection is entirely
/// up to the implementation.
///
/// Return [`SyncError::Rejected`] (or a non-retryable
/// [`SyncError::Backend`]) when retrying cannot succeed; any other error
/// sends the operation back into the queue. Timeouts are the implementation's
/// responsibility: the engine waits as long as the returned future does.
pub trait DataBackend<P>: Send + Sync + 'static {
    /// Value produced by a successful mutation.
    type Output: Send;

    /// Applies one mutation to `collection`.
    fn execute(
        &self,
        operation: OperationKind,
        collection: &str,
        payload: &P,
    ) -> impl Future<Output = SyncResult<Self::Output>> + Send;
}

/// A mutation observed by [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct BackendCall {
    /// Operation type.
    pub operation: OperationKind,
    /// Collection name.
    pub collection: String,
    /// Payload, converted to JSON.
    pub payload: Value,
}

/// A scriptable backend for testing.
///
/// Records every call, and can fail the next N calls, fail every call,
/// reject whole collections, or hold calls until permits are released.
#[derive(Debug, Default)]
pub struct MockBackend {
    calls: Mutex<Vec<BackendCall>>,
    fail_next: AtomicUsize,
    fail_always: AtomicBool,
    rejected: Mutex<HashSet<String>>,
    gate: Option<Semaphore>,
}

impl MockBackend {
    /// Creates a backend that accepts every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend whose calls wait until [`MockBackend::release`] grants permits.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Lets `count` held or future calls proceed.
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Fails the next `count` calls with a retryable error.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Fails every call with a retryable error while set.
    pub fn set_fail_always(&self, fail: bool) {
        self.fail_always.store(fail, Ordering::SeqCst);
    }

    /// Rejects every call targeting `collection`.
    pub fn reject_collection(&self, collection: impl Into<String>) {
        self.rejected.lock().insert(collection.into());
    }

    /// Returns all recorded calls in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn should_fail(&self) -> bool {
        if self.fail_always.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<P: Payload> DataBackend<P> for MockBackend {
    type Output = Value;

    async fn execute(
        &self,
        operation: OperationKind,
        collection: &str,
        payload: &P,
    ) -> SyncResult<Value> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| SyncError::backend_fatal("mock gate closed"))?
                .forget();
        }

        let payload = serde_json::to_value(payload).map_err(ProtocolError::from)?;
        self.calls.lock().push(BackendCall {
            operation,
            collection: collection.to_string(),
            payload: payload.clone(),
        });

        if self.rejected.lock().contains(collection) {
            return Err(SyncError::Rejected(format!(
                "{collection} does not accept {operation}"
            )));
        }
        if self.should_fail() {
            return Err(SyncError::backend_retryable("mock failure"));
        }
        Ok(payload)
    }
}
