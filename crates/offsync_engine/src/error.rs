//! Error types for the sync engine.

use offsync_protocol::ProtocolError;
use offsync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The data backend failed to apply an operation.
    #[error("backend error: {message}")]
    Backend {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The backend refused the operation outright; retrying cannot help.
    #[error("rejected by backend: {0}")]
    Rejected(String),

    /// The backend did not answer in time.
    ///
    /// The engine never produces this itself; backends return it when their
    /// own timeout policy gives up. It counts as retryable.
    #[error("operation timed out")]
    Timeout,

    /// Durable store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Queue codec error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A connectivity signal stream is already attached to this observer.
    #[error("connectivity signals already attached")]
    AlreadyAttached,

    /// The call needs a tokio runtime and none is running.
    #[error("no async runtime available")]
    NoRuntime,
}

impl SyncError {
    /// Creates a retryable backend error.
    pub fn backend_retryable(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable backend error.
    pub fn backend_fatal(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a failed replay should be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Backend { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::Rejected(_) => false,
            // Local failures say nothing about the operation itself
            SyncError::Storage(_)
            | SyncError::Protocol(_)
            | SyncError::AlreadyAttached
            | SyncError::NoRuntime => true,
        }
    }
}

/// An immediate mutation failed and was queued for later replay.
#[derive(Error, Debug)]
#[error("mutation failed and was queued as {queued_id}: {source}")]
pub struct MutationError {
    /// ID of the queued operation that will retry the mutation.
    pub queued_id: String,
    /// The failure of the immediate attempt.
    #[source]
    pub source: SyncError,
}
