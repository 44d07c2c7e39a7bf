//! Events, status and statistics published by the sync manager.

use offsync_protocol::{OperationKind, QueuedOperation};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Instant;

/// Why an operation left the queue without being replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The operation failed after using all of its retries.
    RetriesExhausted,
    /// The backend refused the operation as non-retryable.
    Rejected,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::RetriesExhausted => f.write_str("retries exhausted"),
            DropReason::Rejected => f.write_str("rejected"),
        }
    }
}

/// Something that happened to the queue.
///
/// `Dropped` is the one event that means data loss; hosts should route it to
/// their telemetry.
#[derive(Debug, Clone)]
pub enum SyncEvent<P = Value> {
    /// An operation replayed successfully and left the queue.
    Replayed {
        /// Operation ID.
        id: String,
        /// Collection name.
        collection: String,
        /// Operation type.
        operation: OperationKind,
    },
    /// An operation failed and stays queued with an incremented retry count.
    RetryScheduled {
        /// Operation ID.
        id: String,
        /// Collection name.
        collection: String,
        /// Retry count after the failure.
        retry_count: u32,
        /// The failure.
        error: String,
    },
    /// An operation was permanently removed without being applied.
    Dropped {
        /// The dropped operation, as it was last queued.
        operation: QueuedOperation<P>,
        /// Why it was dropped.
        reason: DropReason,
        /// The final failure.
        error: String,
    },
    /// A drain pass finished.
    DrainCompleted(DrainReport),
    /// The queue was cleared by an operator.
    Cleared {
        /// Number of operations discarded.
        discarded: usize,
    },
}

/// Snapshot of the queue for status indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Number of pending operations.
    pub pending: usize,
    /// Current connectivity.
    pub is_online: bool,
    /// Whether a drain is running.
    pub sync_in_progress: bool,
}

/// Summary of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Operations attempted (the snapshot size).
    pub attempted: usize,
    /// Operations replayed successfully.
    pub replayed: usize,
    /// Operations carried into the next pass.
    pub retried: usize,
    /// Operations permanently dropped.
    pub dropped: usize,
}

/// Why a drain call returned without doing any work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The observer reports offline.
    Offline,
    /// Nothing is queued.
    Empty,
    /// Another drain is running.
    AlreadyRunning,
}

/// Result of [`crate::SyncManager::drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// A pass ran.
    Completed(DrainReport),
    /// No pass ran.
    Skipped(SkipReason),
}

impl DrainOutcome {
    /// Returns the report if a pass ran.
    pub fn report(&self) -> Option<DrainReport> {
        match self {
            DrainOutcome::Completed(report) => Some(*report),
            DrainOutcome::Skipped(_) => None,
        }
    }
}

/// Statistics about sync activity.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of drain passes completed.
    pub drains_completed: u64,
    /// Total number of operations replayed.
    pub operations_replayed: u64,
    /// Total number of failed replays carried forward.
    pub retries: u64,
    /// Total number of operations permanently dropped.
    pub operations_dropped: u64,
    /// When the last drain pass finished.
    pub last_drain_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_camel_case() {
        let status = QueueStatus {
            pending: 2,
            is_online: false,
            sync_in_progress: true,
        };
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            json!({"pending": 2, "isOnline": false, "syncInProgress": true})
        );
    }

    #[test]
    fn outcome_report() {
        let report = DrainReport {
            attempted: 3,
            replayed: 3,
            ..DrainReport::default()
        };
        assert_eq!(DrainOutcome::Completed(report).report(), Some(report));
        assert_eq!(DrainOutcome::Skipped(SkipReason::Empty).report(), None);
    }
}
