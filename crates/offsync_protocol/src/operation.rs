//! Queued operations.

use crate::error::ProtocolError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Type of mutation carried by a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// A record is created.
    Create,
    /// A record is updated.
    Update,
    /// A record is deleted.
    Delete,
}

impl OperationKind {
    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            _ => Err(ProtocolError::UnknownOperation(s.to_string())),
        }
    }
}

/// A mutation waiting to be replayed against the data backend.
///
/// `QueuedOperation` is created at enqueue time and destroyed either when it
/// replays successfully or when it exhausts its retries.
///
/// # Fields
///
/// - `id`: Unique identifier (UUID v4)
/// - `operation`: Create, update or delete
/// - `collection`: Target collection name, opaque to the engine
/// - `payload`: Data needed to replay the mutation; the engine never inspects it
/// - `enqueued_at`: Creation time
/// - `retry_count`: Failed replay attempts so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation<P = serde_json::Value> {
    /// Unique operation ID.
    pub id: String,
    /// Operation type.
    pub operation: OperationKind,
    /// Collection name.
    pub collection: String,
    /// Replay payload.
    pub payload: P,
    /// When the operation was enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Number of failed replay attempts.
    #[serde(default)]
    pub retry_count: u32,
}

impl<P> QueuedOperation<P> {
    /// Creates a new operation with a fresh ID and no retries.
    pub fn new(operation: OperationKind, collection: impl Into<String>, payload: P) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operation,
            collection: collection.into(),
            payload,
            enqueued_at: Utc::now(),
            retry_count: 0,
        }
    }

    /// Returns true if another failure must drop this operation.
    pub fn retries_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }
}
