//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding or parsing protocol values.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The queue could not be serialized or deserialized.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Unknown operation kind name.
    #[error("unknown operation kind: {0:?}")]
    UnknownOperation(String),

    /// Unknown conflict strategy name.
    #[error("unknown conflict strategy: {0:?}")]
    UnknownStrategy(String),
}
