//! # offsync Protocol
//!
//! Data types shared by the offsync engine and its tooling.
//!
//! This crate provides:
//! - [`QueuedOperation`], the unit of deferred work
//! - [`OperationKind`] (create, update, delete)
//! - [`ConflictStrategy`] and [`resolve`] for reconciling two versions of a record
//! - The JSON queue codec used for persistence
//!
//! This is a pure crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod conflict;
mod error;
mod operation;

pub use codec::{decode_queue, encode_queue};
pub use conflict::{resolve, resolve_with_field, ConflictStrategy, UPDATED_AT_FIELD};
pub use error::{ProtocolError, ProtocolResult};
pub use operation::{OperationKind, QueuedOperation};
