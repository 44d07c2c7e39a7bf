//! File-based durable store for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::store::DurableStore;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const VALUE_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// A file-based durable store.
///
/// Each key maps to one file inside the store directory. Values survive
/// process restarts.
///
/// # Durability
///
/// `set` writes the value to a temporary file, calls `File::sync_all()`,
/// then renames it over the previous value. A crash mid-write leaves the
/// previous value intact.
///
/// # Keys
///
/// Keys must be non-empty, must not start with `.`, and may only contain
/// ASCII letters, digits, `.`, `_` and `-`.
///
/// # Example
///
/// ```no_run
/// use offsync_storage::{DurableStore, FileStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("./offsync")).unwrap();
/// store.set("offsync.queue", "[]").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path backing `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the key is not allowed.
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.{VALUE_EXTENSION}")))
    }
}

fn validate_key(key: &str) -> StorageResult<()> {
    let reason = if key.is_empty() {
        Some("key is empty")
    } else if key.starts_with('.') {
        Some("key starts with '.'")
    } else if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        Some("key contains characters outside [A-Za-z0-9._-]")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| StorageError::Corrupted(format!("{}: {e}", path.display())))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let temp = path.with_extension(TEMP_EXTENSION);

        let _guard = self.write_lock.lock();
        {
            let mut file = File::create(&temp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp, &path)?;

        tracing::trace!(path = %path.display(), bytes = value.len(), "stored value");
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
