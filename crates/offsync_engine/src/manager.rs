//! The sync manager: queueing, draining and status.

use crate::backend::{DataBackend, Payload};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::events::{
    DrainOutcome, DrainReport, DropReason, QueueStatus, SkipReason, SyncEvent, SyncStats,
};
use crate::mutation::OfflineMutation;
use crate::network::{Connectivity, ListenerId, NetworkObserver};
use crate::queue::SyncQueueStore;
use offsync_protocol::{OperationKind, QueuedOperation};
use offsync_storage::DurableStore;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};

struct QueueState<P> {
    operations: Vec<QueuedOperation<P>>,
    /// Bumped by `clear()` so an in-flight drain can tell its snapshot is stale.
    generation: u64,
}

struct Inner<P, B> {
    config: SyncConfig,
    queue_store: SyncQueueStore<P>,
    backend: B,
    observer: Arc<NetworkObserver>,
    queue: Mutex<QueueState<P>>,
    draining: AtomicBool,
    stats: RwLock<SyncStats>,
    status: watch::Sender<QueueStatus>,
    events: broadcast::Sender<SyncEvent<P>>,
    listener: Mutex<Option<ListenerId>>,
}

/// Releases the single-flight flag even if a drain future is dropped mid-pass.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Queues mutations while offline and replays them against the backend.
///
/// A `SyncManager` is a cheap handle; clones share the same queue. Hosts
/// should create one per process and pass it around.
///
/// # Lifecycle
///
/// - [`SyncManager::new`] loads the persisted queue and subscribes to the
///   observer, so coming online triggers a drain. A restored queue is
///   drained right away when the observer is already online and a tokio
///   runtime is running; otherwise call [`SyncManager::drain`].
/// - [`SyncManager::shutdown`] unsubscribes again.
///
/// # Key Invariants
///
/// - Operations replay in enqueue order
/// - At most one drain runs at a time
/// - Every queue change is written through to the durable store before the
///   call that made it returns
/// - An operation is retried at most `max_retries` times, then dropped and reported
pub struct SyncManager<P: Payload, B: DataBackend<P>> {
    inner: Arc<Inner<P, B>>,
}

impl<P: Payload, B: DataBackend<P>> Clone for SyncManager<P, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Payload, B: DataBackend<P>> SyncManager<P, B> {
    /// Creates a manager, loading any queue persisted under the configured key.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn DurableStore>,
        backend: B,
        observer: Arc<NetworkObserver>,
    ) -> Self {
        let queue_store = SyncQueueStore::new(store, config.storage_key.clone());
        let operations = queue_store.load();
        let initial = QueueStatus {
            pending: operations.len(),
            is_online: observer.is_online(),
            sync_in_progress: false,
        };
        let (status, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        if !queue_store.is_durable() {
            tracing::debug!("durable storage unavailable; queue lives in memory only");
        }
        if !operations.is_empty() {
            tracing::info!(pending = operations.len(), "restored pending operations");
        }

        let inner = Arc::new(Inner {
            config,
            queue_store,
            backend,
            observer,
            queue: Mutex::new(QueueState {
                operations,
                generation: 0,
            }),
            draining: AtomicBool::new(false),
            stats: RwLock::new(SyncStats::default()),
            status,
            events,
            listener: Mutex::new(None),
        });

        let weak: Weak<Inner<P, B>> = Arc::downgrade(&inner);
        let id = inner.observer.subscribe(Arc::new(move |transition| {
            if let Some(inner) = weak.upgrade() {
                SyncManager { inner }.on_connectivity(transition);
            }
        }));
        *inner.listener.lock() = Some(id);

        let manager = Self { inner };
        let restored = manager.inner.queue.lock().operations.len();
        if restored > 0 && manager.inner.observer.is_online() {
            manager.spawn_drain();
        }
        manager
    }

    /// Unsubscribes from the network observer.
    ///
    /// The queue stays usable, but coming online no longer triggers a drain.
    pub fn shutdown(&self) {
        if let Some(id) = self.inner.listener.lock().take() {
            self.inner.observer.unsubscribe(id);
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Returns the data backend.
    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// Returns the network observer.
    pub fn observer(&self) -> &Arc<NetworkObserver> {
        &self.inner.observer
    }

    /// Queues a mutation and returns its ID.
    ///
    /// The queue is persisted before this returns. If online, a drain is
    /// started in the background; this call does not wait for it.
    pub fn enqueue(
        &self,
        operation: OperationKind,
        collection: impl Into<String>,
        payload: P,
    ) -> String {
        let op = QueuedOperation::new(operation, collection, payload);
        let id = op.id.clone();

        let pending = {
            let mut state = self.inner.queue.lock();
            tracing::debug!(op_id = %op.id, collection = %op.collection, %operation, "enqueued operation");
            state.operations.push(op);
            self.inner.write_through(&state.operations);
            state.operations.len()
        };
        tracing::trace!(pending, "queue length");

        self.inner.publish_status();
        if self.inner.observer.is_online() {
            self.spawn_drain();
        }
        id
    }

    /// Replays pending operations against the backend.
    ///
    /// Returns immediately with [`DrainOutcome::Skipped`] when offline, when
    /// the queue is empty, or when another drain is running. Otherwise the
    /// queue as it stood when the pass began is replayed in order; operations
    /// enqueued during the pass wait for the next one.
    pub async fn drain(&self) -> DrainOutcome {
        let inner = &self.inner;
        if !inner.observer.is_online() {
            return DrainOutcome::Skipped(SkipReason::Offline);
        }
        if inner
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::trace!("drain already running");
            return DrainOutcome::Skipped(SkipReason::AlreadyRunning);
        }

        let (report, highest_retry) = {
            let _guard = DrainGuard(&inner.draining);
            let (snapshot, generation) = {
                let state = inner.queue.lock();
                (state.operations.clone(), state.generation)
            };
            if snapshot.is_empty() {
                return DrainOutcome::Skipped(SkipReason::Empty);
            }
            inner.publish_status();
            self.run_pass(snapshot, generation).await
        };

        inner.publish_status();
        let _ = inner.events.send(SyncEvent::DrainCompleted(report));

        let retry = &inner.config.retry;
        if retry.auto_retry && report.retried > 0 && inner.observer.is_online() {
            self.schedule_retry(retry.delay_for_attempt(highest_retry));
        }

        DrainOutcome::Completed(report)
    }

    async fn run_pass(
        &self,
        snapshot: Vec<QueuedOperation<P>>,
        generation: u64,
    ) -> (DrainReport, u32) {
        let inner = &self.inner;
        let max_retries = inner.config.retry.max_retries;
        let snapshot_len = snapshot.len();
        let mut report = DrainReport {
            attempted: snapshot_len,
            ..DrainReport::default()
        };
        let mut carried = Vec::new();
        let mut highest_retry = 0;

        tracing::debug!(pending = snapshot_len, "drain started");

        for mut op in snapshot {
            let result = inner
                .backend
                .execute(op.operation, &op.collection, &op.payload)
                .await;

            match result {
                Ok(_) => {
                    report.replayed += 1;
                    tracing::debug!(op_id = %op.id, collection = %op.collection, "replayed operation");
                    let _ = inner.events.send(SyncEvent::Replayed {
                        id: op.id,
                        collection: op.collection,
                        operation: op.operation,
                    });
                }
                Err(e) if !e.is_retryable() => {
                    report.dropped += 1;
                    inner.report_drop(op, DropReason::Rejected, &e);
                }
                Err(e) if op.retries_exhausted(max_retries) => {
                    report.dropped += 1;
                    inner.report_drop(op, DropReason::RetriesExhausted, &e);
                }
                Err(e) => {
                    op.retry_count += 1;
                    report.retried += 1;
                    highest_retry = highest_retry.max(op.retry_count);
                    tracing::warn!(
                        op_id = %op.id,
                        collection = %op.collection,
                        retry_count = op.retry_count,
                        max_retries,
                        error = %e,
                        "replay failed; operation stays queued"
                    );
                    {
                        let mut stats = inner.stats.write();
                        stats.retries += 1;
                        stats.last_error = Some(e.to_string());
                    }
                    let _ = inner.events.send(SyncEvent::RetryScheduled {
                        id: op.id.clone(),
                        collection: op.collection.clone(),
                        retry_count: op.retry_count,
                        error: e.to_string(),
                    });
                    carried.push(op);
                }
            }
        }

        let pending = {
            let mut state = inner.queue.lock();
            if state.generation == generation {
                let len = state.operations.len();
                let arrived = state.operations.split_off(snapshot_len.min(len));
                carried.extend(arrived);
                state.operations = carried;
                inner.write_through(&state.operations);
            } else {
                tracing::debug!(
                    discarded = carried.len(),
                    "queue cleared during drain; discarding carried operations"
                );
            }
            state.operations.len()
        };

        {
            let mut stats = inner.stats.write();
            stats.drains_completed += 1;
            stats.operations_replayed += report.replayed as u64;
            stats.last_drain_time = Some(Instant::now());
        }

        tracing::info!(
            attempted = report.attempted,
            replayed = report.replayed,
            retried = report.retried,
            dropped = report.dropped,
            pending,
            "drain completed"
        );

        (report, highest_retry)
    }

    /// Returns a snapshot of the queue status.
    pub fn queue_status(&self) -> QueueStatus {
        self.inner.current_status()
    }

    /// Subscribes to status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<QueueStatus> {
        self.inner.status.subscribe()
    }

    /// Subscribes to queue events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent<P>> {
        self.inner.events.subscribe()
    }

    /// Returns the pending operations in replay order.
    pub fn pending_operations(&self) -> Vec<QueuedOperation<P>> {
        self.inner.queue.lock().operations.clone()
    }

    /// Returns sync statistics.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.read().clone()
    }

    /// Discards every pending operation, in memory and in the durable store.
    ///
    /// A drain that is running when this is called finishes its current
    /// attempts but does not put failures back into the queue.
    pub fn clear(&self) {
        let discarded = {
            let mut state = self.inner.queue.lock();
            let discarded = state.operations.len();
            state.operations.clear();
            state.generation += 1;
            if let Err(e) = self.inner.queue_store.clear() {
                self.inner.record_storage_error("clear", &e);
            }
            discarded
        };

        tracing::warn!(discarded, "sync queue cleared");
        let _ = self.inner.events.send(SyncEvent::Cleared { discarded });
        self.inner.publish_status();
    }

    /// Creates an offline-aware mutation for one collection and operation type.
    pub fn mutation(
        &self,
        operation: OperationKind,
        collection: impl Into<String>,
    ) -> OfflineMutation<P, B> {
        OfflineMutation::new(self.clone(), operation, collection.into())
    }

    fn on_connectivity(&self, transition: Connectivity) {
        self.inner.publish_status();
        if transition == Connectivity::Online {
            self.spawn_drain();
        }
    }

    fn spawn_drain(&self) {
        match Handle::try_current() {
            Ok(handle) => {
                let manager = self.clone();
                handle.spawn(async move {
                    manager.drain().await;
                });
            }
            Err(_) => tracing::debug!("no async runtime; drain deferred"),
        }
    }

    fn schedule_retry(&self, delay: std::time::Duration) {
        match Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(delay_ms = delay.as_millis() as u64, "scheduling retry drain");
                let manager = self.clone();
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    manager.drain().await;
                });
            }
            Err(_) => tracing::debug!("no async runtime; retry drain not scheduled"),
        }
    }
}

impl<P: Payload, B> Inner<P, B> {
    fn write_through(&self, operations: &[QueuedOperation<P>]) {
        if let Err(e) = self.queue_store.persist(operations) {
            self.record_storage_error("persist", &e);
        }
    }

    fn record_storage_error(&self, action: &'static str, error: &SyncError) {
        tracing::warn!(
            key = %self.queue_store.key(),
            action,
            error = %error,
            "sync queue storage failed; in-memory queue remains authoritative"
        );
        self.stats.write().last_error = Some(error.to_string());
    }

    fn report_drop(&self, operation: QueuedOperation<P>, reason: DropReason, error: &SyncError) {
        tracing::error!(
            op_id = %operation.id,
            collection = %operation.collection,
            operation = %operation.operation,
            retry_count = operation.retry_count,
            %reason,
            error = %error,
            "queued operation permanently dropped"
        );
        {
            let mut stats = self.stats.write();
            stats.operations_dropped += 1;
            stats.last_error = Some(error.to_string());
        }
        let _ = self.events.send(SyncEvent::Dropped {
            operation,
            reason,
            error: error.to_string(),
        });
    }

    fn current_status(&self) -> QueueStatus {
        QueueStatus {
            pending: self.queue.lock().operations.len(),
            is_online: self.observer.is_online(),
            sync_in_progress: self.draining.load(Ordering::SeqCst),
        }
    }

    fn publish_status(&self) {
        self.status.send_replace(self.current_status());
    }
}
