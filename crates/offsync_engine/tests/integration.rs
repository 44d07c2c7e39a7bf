//! Integration tests for the sync manager.

use offsync_engine::{
    DataBackend, DrainOutcome, DrainReport, DropReason, MockBackend, MutationOutcome,
    NetworkObserver, RetryConfig, SkipReason, SyncConfig, SyncEvent, SyncManager, SyncResult,
    DEFAULT_STORAGE_KEY,
};
use offsync_protocol::OperationKind;
use offsync_storage::{
    DurableStore, FileStore, InMemoryStore, StorageError, StorageResult, UnavailableStore,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;

type Manager = SyncManager<Value, MockBackend>;

fn manager_with(
    config: SyncConfig,
    store: Arc<dyn DurableStore>,
    backend: MockBackend,
    observer: NetworkObserver,
) -> Manager {
    SyncManager::new(config, store, backend, Arc::new(observer))
}

fn offline_manager() -> Manager {
    manager_with(
        SyncConfig::default(),
        Arc::new(InMemoryStore::new()),
        MockBackend::new(),
        NetworkObserver::offline(),
    )
}

/// Goes online without the connectivity listener starting a background drain.
fn go_online_quietly(manager: &Manager) {
    manager.shutdown();
    manager.observer().signal_online();
}

async fn next_drain(events: &mut broadcast::Receiver<SyncEvent>) -> DrainReport {
    timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(SyncEvent::DrainCompleted(report)) => return report,
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {e}"),
            }
        }
    })
    .await
    .expect("drain did not complete")
}

async fn wait_until_draining(manager: &Manager) {
    let mut status = manager.subscribe_status();
    timeout(Duration::from_secs(5), status.wait_for(|s| s.sync_in_progress))
        .await
        .expect("drain did not start")
        .expect("status channel closed");
}

fn payloads(manager: &Manager) -> Vec<Value> {
    manager
        .backend()
        .calls()
        .into_iter()
        .map(|call| call.payload)
        .collect()
}

/// A store whose writes always fail.
struct ReadOnlyStore;

impl DurableStore for ReadOnlyStore {
    fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Corrupted("read-only filesystem".into()))
    }

    fn remove(&self, _key: &str) -> StorageResult<()> {
        Err(StorageError::Corrupted("read-only filesystem".into()))
    }
}

#[tokio::test]
async fn replay_order_matches_enqueue_order() {
    let manager = offline_manager();
    for seq in 0..5 {
        manager.enqueue(OperationKind::Create, "widgets", json!({"seq": seq}));
    }
    let mut events = manager.subscribe_events();

    manager.observer().signal_online();
    let report = next_drain(&mut events).await;

    assert_eq!(report.replayed, 5);
    assert_eq!(
        payloads(&manager),
        (0..5).map(|seq| json!({"seq": seq})).collect::<Vec<_>>()
    );
    assert_eq!(manager.queue_status().pending, 0);
}

#[tokio::test]
async fn concurrent_drain_is_noop() {
    let manager = manager_with(
        SyncConfig::default(),
        Arc::new(InMemoryStore::new()),
        MockBackend::gated(),
        NetworkObserver::offline(),
    );
    manager.enqueue(OperationKind::Create, "widgets", json!(1));
    manager.enqueue(OperationKind::Create, "widgets", json!(2));
    go_online_quietly(&manager);

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.drain().await }
    });
    wait_until_draining(&manager).await;

    assert_eq!(
        manager.drain().await,
        DrainOutcome::Skipped(SkipReason::AlreadyRunning)
    );

    manager.backend().release(2);
    let report = first.await.unwrap().report().unwrap();
    assert_eq!(report.replayed, 2);
    assert_eq!(manager.backend().call_count(), 2);
    assert_eq!(manager.drain().await, DrainOutcome::Skipped(SkipReason::Empty));
    assert!(!manager.queue_status().sync_in_progress);
}

#[tokio::test]
async fn failing_operation_is_retried_then_dropped() {
    let manager = manager_with(
        SyncConfig::new().with_max_retries(3),
        Arc::new(InMemoryStore::new()),
        MockBackend::new(),
        NetworkObserver::offline(),
    );
    manager.backend().set_fail_always(true);
    let id = manager.enqueue(OperationKind::Update, "widgets", json!({"id": 1}));
    let mut events = manager.subscribe_events();
    go_online_quietly(&manager);

    for expected in 1..=3 {
        let report = manager.drain().await.report().unwrap();
        assert_eq!(report.retried, 1);
        let pending = manager.pending_operations();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, expected);
    }

    let report = manager.drain().await.report().unwrap();
    assert_eq!(report.dropped, 1);
    assert_eq!(manager.queue_status().pending, 0);
    // One initial attempt plus three retries
    assert_eq!(manager.backend().call_count(), 4);

    let stats = manager.stats();
    assert_eq!(stats.retries, 3);
    assert_eq!(stats.operations_dropped, 1);
    assert!(stats.last_error.is_some());

    let mut dropped = None;
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::Dropped {
            operation, reason, ..
        } = event
        {
            dropped = Some((operation, reason));
        }
    }
    let (operation, reason) = dropped.expect("drop was not reported");
    assert_eq!(operation.id, id);
    assert_eq!(operation.retry_count, 3);
    assert_eq!(reason, DropReason::RetriesExhausted);
}

#[tokio::test]
async fn no_retry_drops_on_first_failure() {
    let manager = manager_with(
        SyncConfig::new().with_retry(RetryConfig::no_retry()),
        Arc::new(InMemoryStore::new()),
        MockBackend::new(),
        NetworkObserver::offline(),
    );
    manager.backend().fail_next(1);
    manager.enqueue(OperationKind::Delete, "widgets", json!("w-1"));
    go_online_quietly(&manager);

    let report = manager.drain().await.report().unwrap();
    assert_eq!(report.dropped, 1);
    assert_eq!(manager.queue_status().pending, 0);
}

#[test]
fn queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let before = {
        let manager = manager_with(
            SyncConfig::default(),
            Arc::new(FileStore::open(dir.path()).unwrap()),
            MockBackend::new(),
            NetworkObserver::offline(),
        );
        manager.enqueue(OperationKind::Create, "widgets", json!({"name": "a"}));
        manager.enqueue(OperationKind::Update, "widgets", json!({"name": "b"}));
        manager.enqueue(OperationKind::Delete, "gadgets", json!("g-1"));
        manager.pending_operations()
    };

    let restarted = manager_with(
        SyncConfig::default(),
        Arc::new(FileStore::open(dir.path()).unwrap()),
        MockBackend::new(),
        NetworkObserver::offline(),
    );
    assert_eq!(restarted.pending_operations(), before);
    assert_eq!(restarted.queue_status().pending, 3);
}

#[tokio::test]
async fn retry_counts_survive_restart() {
    let store: Arc<dyn DurableStore> = Arc::new(InMemoryStore::new());

    let manager = manager_with(
        SyncConfig::default(),
        Arc::clone(&store),
        MockBackend::new(),
        NetworkObserver::offline(),
    );
    manager.backend().fail_next(1);
    manager.enqueue(OperationKind::Create, "widgets", json!(1));
    go_online_quietly(&manager);
    manager.drain().await;
    drop(manager);

    let restarted = manager_with(
        SyncConfig::default(),
        store,
        MockBackend::new(),
        NetworkObserver::offline(),
    );
    assert_eq!(restarted.pending_operations()[0].retry_count, 1);
}

#[tokio::test]
async fn offline_drain_is_noop_until_online() {
    let manager = offline_manager();
    manager.enqueue(OperationKind::Create, "widgets", json!(1));
    manager.enqueue(OperationKind::Create, "widgets", json!(2));

    assert_eq!(manager.drain().await, DrainOutcome::Skipped(SkipReason::Offline));
    assert_eq!(manager.backend().call_count(), 0);
    assert_eq!(manager.queue_status().pending, 2);

    let mut events = manager.subscribe_events();
    assert!(manager.observer().signal_online());
    assert!(!manager.observer().signal_online());
    next_drain(&mut events).await;

    assert_eq!(manager.backend().call_count(), 2);
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn offline_create_replays_when_online() {
    let manager = offline_manager();
    manager.enqueue(OperationKind::Create, "widgets", json!({"name": "x"}));

    let status = manager.queue_status();
    assert_eq!(status.pending, 1);
    assert!(!status.is_online);

    let mut events = manager.subscribe_events();
    manager.observer().signal_online();
    next_drain(&mut events).await;

    let status = manager.queue_status();
    assert_eq!(status.pending, 0);
    assert!(status.is_online);
    let calls = manager.backend().calls();
    assert_eq!(calls[0].operation, OperationKind::Create);
    assert_eq!(calls[0].collection, "widgets");
}

#[tokio::test]
async fn transient_failures_recover_on_second_drain() {
    let manager = offline_manager();
    manager.backend().fail_next(3);
    for n in 0..3 {
        manager.enqueue(OperationKind::Update, "widgets", json!({"n": n}));
    }
    go_online_quietly(&manager);

    let first = manager.drain().await.report().unwrap();
    assert_eq!(first.retried, 3);
    let pending = manager.pending_operations();
    assert_eq!(pending.len(), 3);
    assert!(pending.iter().all(|op| op.retry_count == 1));

    let second = manager.drain().await.report().unwrap();
    assert_eq!(second.replayed, 3);
    assert_eq!(manager.queue_status().pending, 0);
}

#[test]
fn corrupt_queue_starts_empty() {
    let store = InMemoryStore::with_value(DEFAULT_STORAGE_KEY, "[{\"id\": 42, \"oops\"");
    let manager = manager_with(
        SyncConfig::default(),
        Arc::new(store),
        MockBackend::new(),
        NetworkObserver::offline(),
    );
    assert_eq!(manager.queue_status().pending, 0);

    // The next write replaces the corrupt value
    manager.enqueue(OperationKind::Create, "widgets", json!(1));
    assert_eq!(manager.queue_status().pending, 1);
}

#[test]
fn corrupt_queue_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    std::fs::write(store.path_for(DEFAULT_STORAGE_KEY).unwrap(), b"not json").unwrap();

    let manager = manager_with(
        SyncConfig::default(),
        Arc::new(store),
        MockBackend::new(),
        NetworkObserver::offline(),
    );
    assert_eq!(manager.queue_status().pending, 0);
}

#[test]
fn persist_failure_keeps_memory_queue() {
    let manager = manager_with(
        SyncConfig::default(),
        Arc::new(ReadOnlyStore),
        MockBackend::new(),
        NetworkObserver::offline(),
    );
    manager.enqueue(OperationKind::Create, "widgets", json!(1));

    assert_eq!(manager.queue_status().pending, 1);
    let last_error = manager.stats().last_error.expect("persist failure recorded");
    assert!(last_error.contains("read-only"));

    manager.clear();
    assert_eq!(manager.queue_status().pending, 0);
}

#[test]
fn unavailable_store_keeps_memory_queue() {
    let manager = manager_with(
        SyncConfig::default(),
        Arc::new(UnavailableStore),
        MockBackend::new(),
        NetworkObserver::offline(),
    );
    manager.enqueue(OperationKind::Create, "widgets", json!(1));
    assert_eq!(manager.queue_status().pending, 1);
    assert!(manager.stats().last_error.is_none());
}

#[tokio::test]
async fn clear_during_drain_discards_failures() {
    let store = Arc::new(InMemoryStore::new());
    let manager = manager_with(
        SyncConfig::default(),
        store.clone(),
        MockBackend::gated(),
        NetworkObserver::offline(),
    );
    manager.backend().set_fail_always(true);
    manager.enqueue(OperationKind::Create, "widgets", json!(1));
    manager.enqueue(OperationKind::Create, "widgets", json!(2));
    go_online_quietly(&manager);

    let drain = tokio::spawn({
        let manager = manager.clone();
        async move { manager.drain().await }
    });
    wait_until_draining(&manager).await;

    manager.clear();
    manager.backend().release(2);

    let report = drain.await.unwrap().report().unwrap();
    assert_eq!(report.retried, 2);
    assert_eq!(manager.queue_status().pending, 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn enqueue_during_drain_waits_for_next_pass() {
    let manager = manager_with(
        SyncConfig::default(),
        Arc::new(InMemoryStore::new()),
        MockBackend::gated(),
        NetworkObserver::offline(),
    );
    manager.enqueue(OperationKind::Create, "widgets", json!("a"));
    manager.enqueue(OperationKind::Create, "widgets", json!("b"));
    let mut events = manager.subscribe_events();

    manager.observer().signal_online();
    wait_until_draining(&manager).await;

    // Going offline does not abort the running pass
    manager.observer().signal_offline();
    let late = manager.enqueue(OperationKind::Create, "widgets", json!("c"));
    manager.backend().release(2);

    let report = next_drain(&mut events).await;
    assert_eq!(report.attempted, 2);
    assert_eq!(report.replayed, 2);

    let pending = manager.pending_operations();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, late);
    assert_eq!(payloads(&manager), vec![json!("a"), json!("b")]);
}

#[tokio::test]
async fn failures_keep_their_place_ahead_of_new_operations() {
    let manager = manager_with(
        SyncConfig::default(),
        Arc::new(InMemoryStore::new()),
        MockBackend::gated(),
        NetworkObserver::offline(),
    );
    manager.backend().fail_next(1);
    let first = manager.enqueue(OperationKind::Create, "widgets", json!("a"));
    go_online_quietly(&manager);

    let drain = tokio::spawn({
        let manager = manager.clone();
        async move { manager.drain().await }
    });
    wait_until_draining(&manager).await;
    let second = manager.enqueue(OperationKind::Create, "widgets", json!("b"));
    manager.backend().release(1);
    drain.await.unwrap();

    let ids: Vec<_> = manager
        .pending_operations()
        .into_iter()
        .map(|op| op.id)
        .collect();
    assert_eq!(ids, vec![first, second]);
}

#[tokio::test]
async fn auto_retry_schedules_follow_up_drain() {
    let retry = RetryConfig::new(3)
        .with_initial_delay(Duration::from_millis(10))
        .with_jitter(false)
        .with_auto_retry(true);
    let manager = manager_with(
        SyncConfig::new().with_retry(retry),
        Arc::new(InMemoryStore::new()),
        MockBackend::new(),
        NetworkObserver::offline(),
    );
    manager.backend().fail_next(1);
    manager.enqueue(OperationKind::Create, "widgets", json!(1));
    let mut events = manager.subscribe_events();

    manager.observer().signal_online();
    let first = next_drain(&mut events).await;
    assert_eq!(first.retried, 1);

    let second = next_drain(&mut events).await;
    assert_eq!(second.replayed, 1);
    assert_eq!(manager.queue_status().pending, 0);
}

#[tokio::test]
async fn unbounded_backoff_does_not_break_drain() {
    let retry = RetryConfig::new(5)
        .with_max_delay(Duration::MAX)
        .with_backoff_multiplier(1e300)
        .with_auto_retry(true);
    let manager = manager_with(
        SyncConfig::new().with_retry(retry),
        Arc::new(InMemoryStore::new()),
        MockBackend::new(),
        NetworkObserver::offline(),
    );
    manager.backend().set_fail_always(true);
    manager.enqueue(OperationKind::Create, "widgets", json!(1));
    go_online_quietly(&manager);

    for expected in 1..=3 {
        let report = manager.drain().await.report().unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(manager.pending_operations()[0].retry_count, expected);
    }
}

#[tokio::test]
async fn restored_queue_drains_when_started_online() {
    let store: Arc<dyn DurableStore> = Arc::new(InMemoryStore::new());
    {
        let manager = manager_with(
            SyncConfig::default(),
            Arc::clone(&store),
            MockBackend::new(),
            NetworkObserver::offline(),
        );
        manager.enqueue(OperationKind::Create, "widgets", json!({"name": "a"}));
        manager.enqueue(OperationKind::Update, "widgets", json!({"name": "b"}));
    }

    let manager = manager_with(
        SyncConfig::default(),
        store,
        MockBackend::new(),
        NetworkObserver::online(),
    );
    let mut events = manager.subscribe_events();

    let report = next_drain(&mut events).await;
    assert_eq!(report.replayed, 2);
    assert_eq!(manager.queue_status().pending, 0);
    assert_eq!(
        payloads(&manager),
        vec![json!({"name": "a"}), json!({"name": "b"})]
    );
}

#[tokio::test]
async fn attached_signal_stream_triggers_drain() {
    let observer = Arc::new(NetworkObserver::offline());
    let manager: Manager = SyncManager::new(
        SyncConfig::default(),
        Arc::new(InMemoryStore::new()),
        MockBackend::new(),
        Arc::clone(&observer),
    );
    let (signals, rx) = watch::channel(false);
    observer.attach(rx).unwrap();

    manager.enqueue(OperationKind::Create, "widgets", json!(1));
    let mut events = manager.subscribe_events();
    signals.send(true).unwrap();

    next_drain(&mut events).await;
    assert_eq!(manager.queue_status().pending, 0);
}

#[tokio::test]
async fn status_updates_are_pushed() {
    let manager = offline_manager();
    let mut status = manager.subscribe_status();

    manager.enqueue(OperationKind::Create, "widgets", json!(1));
    assert!(status.has_changed().unwrap());
    assert_eq!(status.borrow_and_update().pending, 1);

    manager.clear();
    assert_eq!(status.borrow_and_update().pending, 0);
}

#[tokio::test]
async fn mutation_factory_applies_or_queues() {
    let manager = offline_manager();
    let create = manager.mutation(OperationKind::Create, "widgets");

    let queued = create.execute(json!({"name": "x"})).await.unwrap();
    assert!(queued.is_queued());

    go_online_quietly(&manager);
    let applied = create.execute(json!({"name": "y"})).await.unwrap();
    assert_eq!(applied, MutationOutcome::Applied(json!({"name": "y"})));

    // The queued mutation is still waiting for a drain
    assert_eq!(manager.queue_status().pending, 1);
    manager.drain().await;
    assert_eq!(payloads(&manager), vec![json!({"name": "y"}), json!({"name": "x"})]);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Todo {
    title: String,
    done: bool,
}

/// A typed backend that assigns row numbers.
#[derive(Default)]
struct TodoBackend {
    rows: Mutex<Vec<Todo>>,
}

impl DataBackend<Todo> for TodoBackend {
    type Output = usize;

    async fn execute(
        &self,
        _operation: OperationKind,
        _collection: &str,
        payload: &Todo,
    ) -> SyncResult<usize> {
        let mut rows = self.rows.lock();
        rows.push(payload.clone());
        Ok(rows.len())
    }
}

#[tokio::test]
async fn typed_payloads_round_trip() {
    let store: Arc<dyn DurableStore> = Arc::new(InMemoryStore::new());
    let todo = Todo {
        title: "milk".into(),
        done: false,
    };

    let manager = SyncManager::new(
        SyncConfig::default(),
        Arc::clone(&store),
        TodoBackend::default(),
        Arc::new(NetworkObserver::offline()),
    );
    manager.enqueue(OperationKind::Create, "todos", todo.clone());
    drop(manager);

    let manager = SyncManager::new(
        SyncConfig::default(),
        store,
        TodoBackend::default(),
        Arc::new(NetworkObserver::offline()),
    );
    assert_eq!(manager.pending_operations()[0].payload, todo);

    manager.shutdown();
    manager.observer().signal_online();
    manager.drain().await;
    assert_eq!(*manager.backend().rows.lock(), vec![todo]);
}

proptest! {
    #[test]
    fn replay_preserves_order(payloads_in in prop::collection::vec(any::<i64>(), 1..20)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let manager = offline_manager();
        for value in &payloads_in {
            manager.enqueue(OperationKind::Create, "numbers", json!(value));
        }
        go_online_quietly(&manager);

        let report = runtime.block_on(manager.drain()).report().unwrap();
        prop_assert_eq!(report.replayed, payloads_in.len());

        let expected: Vec<Value> = payloads_in.iter().map(|v| json!(v)).collect();
        prop_assert_eq!(payloads(&manager), expected);
    }
}
