//! Offline-aware mutations: apply now when online, queue otherwise.

use crate::backend::{DataBackend, Payload};
use crate::error::MutationError;
use crate::manager::SyncManager;
use offsync_protocol::OperationKind;
use serde::Serialize;

/// Acknowledgement that a mutation was queued instead of applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedAck {
    /// ID of the queued operation.
    pub id: String,
    /// Always true.
    pub queued: bool,
}

/// Result of an [`OfflineMutation`].
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<O> {
    /// The backend applied the mutation.
    Applied(O),
    /// The process was offline; the mutation waits in the queue.
    Queued(QueuedAck),
}

impl<O> MutationOutcome<O> {
    /// Returns true if the mutation was queued.
    pub fn is_queued(&self) -> bool {
        matches!(self, MutationOutcome::Queued(_))
    }
}

/// A mutation bound to one collection and operation type.
///
/// Created by [`SyncManager::mutation`].
pub struct OfflineMutation<P: Payload, B: DataBackend<P>> {
    manager: SyncManager<P, B>,
    operation: OperationKind,
    collection: String,
}

impl<P: Payload, B: DataBackend<P>> OfflineMutation<P, B> {
    pub(crate) fn new(
        manager: SyncManager<P, B>,
        operation: OperationKind,
        collection: String,
    ) -> Self {
        Self {
            manager,
            operation,
            collection,
        }
    }

    /// Returns the operation type.
    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Applies `payload`, or queues it when offline.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError`] when online and the backend call fails. The
    /// mutation has already been queued for replay by then; the error carries
    /// its queue ID. Offline calls never fail.
    pub async fn execute(&self, payload: P) -> Result<MutationOutcome<B::Output>, MutationError> {
        if !self.manager.observer().is_online() {
            let id = self
                .manager
                .enqueue(self.operation, self.collection.clone(), payload);
            return Ok(MutationOutcome::Queued(QueuedAck { id, queued: true }));
        }

        match self
            .manager
            .backend()
            .execute(self.operation, &self.collection, &payload)
            .await
        {
            Ok(output) => Ok(MutationOutcome::Applied(output)),
            Err(source) => {
                let queued_id = self
                    .manager
                    .enqueue(self.operation, self.collection.clone(), payload);
                tracing::warn!(
                    op_id = %queued_id,
                    collection = %self.collection,
                    error = %source,
                    "immediate mutation failed; queued for replay"
                );
                Err(MutationError { queued_id, source })
            }
        }
    }
}

impl<P: Payload, B: DataBackend<P>> Clone for OfflineMutation<P, B> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            operation: self.operation,
            collection: self.collection.clone(),
        }
    }
}
