//! Inspect command implementation.

use offsync_engine::SyncQueueStore;
use offsync_protocol::QueuedOperation;
use offsync_storage::FileStore;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Queue inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store directory.
    pub dir: String,
    /// Storage key.
    pub key: String,
    /// Number of pending operations.
    pub pending: usize,
    /// Pending operations per collection.
    pub collections: BTreeMap<String, usize>,
    /// Pending operations in replay order.
    pub operations: Vec<QueuedOperation<Value>>,
}

/// Runs the inspect command.
pub fn run(dir: &Path, key: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(dir, key)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Loads the queue stored under `key` in `dir`.
pub fn inspect(dir: &Path, key: &str) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !dir.is_dir() {
        return Err(format!("No store directory at {:?}", dir).into());
    }

    let store = FileStore::open(dir)?;
    let queue: SyncQueueStore<Value> = SyncQueueStore::new(Arc::new(store), key);
    let operations = queue.try_load()?;

    let mut collections = BTreeMap::new();
    for op in &operations {
        *collections.entry(op.collection.clone()).or_insert(0) += 1;
    }

    Ok(InspectResult {
        dir: dir.display().to_string(),
        key: key.to_string(),
        pending: operations.len(),
        collections,
        operations,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("offsync Queue Inspection");
    println!("========================");
    println!();
    println!("Directory: {}", result.dir);
    println!("Key:       {}", result.key);
    println!("Pending:   {}", result.pending);

    if !result.collections.is_empty() {
        println!();
        println!("Collections:");
        for (collection, count) in &result.collections {
            println!("  {collection}: {count}");
        }
    }

    if !result.operations.is_empty() {
        println!();
        println!("Operations:");
        for (position, op) in result.operations.iter().enumerate() {
            println!(
                "  {:>3}. {} {:<6} {} (retries: {}, queued {})",
                position + 1,
                op.id,
                op.operation.as_str(),
                op.collection,
                op.retry_count,
                op.enqueued_at.to_rfc3339()
            );
        }
    }
}
