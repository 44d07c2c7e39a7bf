//! Clear command implementation.

use offsync_engine::SyncQueueStore;
use offsync_storage::FileStore;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Runs the clear command.
///
/// Pending operations are discarded without being replayed, so `confirmed`
/// must be set.
pub fn run(dir: &Path, key: &str, confirmed: bool) -> Result<(), Box<dyn std::error::Error>> {
    let discarded = clear(dir, key, confirmed)?;
    println!("Discarded {discarded} pending operation(s) from {key}");
    Ok(())
}

/// Removes the queue stored under `key`, returning how many operations it held.
pub fn clear(dir: &Path, key: &str, confirmed: bool) -> Result<usize, Box<dyn std::error::Error>> {
    if !confirmed {
        return Err("Refusing to discard pending operations without --yes".into());
    }
    if !dir.is_dir() {
        return Err(format!("No store directory at {:?}", dir).into());
    }

    let queue: SyncQueueStore<Value> = SyncQueueStore::new(Arc::new(FileStore::open(dir)?), key);
    // A corrupt queue is still cleared
    let discarded = match queue.try_load() {
        Ok(operations) => operations.len(),
        Err(e) => {
            tracing::warn!(key, error = %e, "clearing unreadable queue");
            0
        }
    };
    queue.clear()?;
    tracing::info!(key, discarded, "queue cleared");

    Ok(discarded)
}
