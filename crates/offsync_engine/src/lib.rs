//! # offsync Engine
//!
//! Offline-aware sync queue for offsync.
//!
//! This crate provides:
//! - A durable, ordered queue of pending mutations
//! - Connectivity tracking with listener notification
//! - Queue replay against a host-supplied data backend
//! - Bounded retry with drop reporting
//! - An "apply now or queue" mutation helper
//!
//! ## Architecture
//!
//! Mutations made while offline are appended to the queue and written
//! through to a [`offsync_storage::DurableStore`]. When the
//! [`NetworkObserver`] reports a transition to online, the [`SyncManager`]
//! drains the queue: each operation is replayed in order against the
//! [`DataBackend`], successes leave the queue, and failures stay queued with
//! an incremented retry count until the retry bound drops them.
//!
//! ## Key Invariants
//!
//! - Replay order equals enqueue order
//! - At most one drain runs at a time
//! - Queue changes are persisted before the call making them returns
//! - A permanently dropped operation is always logged and published as an event
//! - Broken local storage degrades to an in-memory queue, never to an error
//!
//! ## Example
//!
//! ```rust
//! use offsync_engine::{MockBackend, NetworkObserver, SyncConfig, SyncManager};
//! use offsync_protocol::OperationKind;
//! use offsync_storage::InMemoryStore;
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! let observer = Arc::new(NetworkObserver::offline());
//! let manager: SyncManager<Value, MockBackend> = SyncManager::new(
//!     SyncConfig::default(),
//!     Arc::new(InMemoryStore::new()),
//!     MockBackend::new(),
//!     observer,
//! );
//!
//! manager.enqueue(OperationKind::Create, "todos", json!({"title": "milk"}));
//! assert_eq!(manager.queue_status().pending, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod error;
mod events;
mod manager;
mod mutation;
mod network;
mod queue;

pub use backend::{BackendCall, DataBackend, MockBackend, Payload};
pub use config::{RetryConfig, SyncConfig, DEFAULT_STORAGE_KEY};
pub use error::{MutationError, SyncError, SyncResult};
pub use events::{
    DrainOutcome, DrainReport, DropReason, QueueStatus, SkipReason, SyncEvent, SyncStats,
};
pub use manager::SyncManager;
pub use mutation::{MutationOutcome, OfflineMutation, QueuedAck};
pub use network::{
    Connectivity, ConnectivityCapability, ConnectivityListener, ListenerId, NetworkObserver,
};
pub use queue::SyncQueueStore;
