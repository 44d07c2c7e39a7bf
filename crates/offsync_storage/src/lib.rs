//! # offsync Storage
//!
//! Durable key-value store abstraction for offsync.
//!
//! The sync engine keeps its pending-operation queue in a **durable store**:
//! a string-keyed map whose contents survive process restarts. Stores are
//! opaque: they never interpret the values they hold.
//!
//! ## Design Principles
//!
//! - Stores are simple string maps (get, set, remove)
//! - Calls are synchronous from the engine's point of view
//! - Must be `Send + Sync` for shared access
//! - A store may report itself unavailable (no-storage environments)
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral queues
//! - [`FileStore`] - One file per key inside a directory
//! - [`UnavailableStore`] - Environments without durable storage; every call is a no-op
//!
//! ## Example
//!
//! ```rust
//! use offsync_storage::{DurableStore, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! store.set("queue", "[]").unwrap();
//! assert_eq!(store.get("queue").unwrap().as_deref(), Some("[]"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::{DurableStore, UnavailableStore};
