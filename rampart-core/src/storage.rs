//! Persisted state storage.
//!
//! Safety state (trainer counters, production history, promotion ledger,
//! rollback audit) is written through [`StateStore`] after every mutation and
//! reloaded on restart. Values are JSON documents addressed by a flat key.
//!
//! Saves happen inside component critical sections, so the trait is
//! synchronous.

use crate::error::StorageError;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Pluggable key/value storage for persisted state.
pub trait StateStore: Send + Sync + fmt::Debug {
    /// Loads the document stored under `key`.
    fn load(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Stores `value` under `key`, replacing any previous document.
    fn save(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Removes the document stored under `key`. Returns true if one existed.
    fn remove(&self, key: &str) -> Result<bool, StorageError>;
}

/// Loads and decodes a typed document.
pub fn load_typed<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    store
        .load(key)?
        .map(|value| {
            serde_json::from_value(value).map_err(|e| StorageError::DeserializationError {
                key: key.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

/// Encodes and stores a typed document.
pub fn save_typed<T: Serialize>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let value = serde_json::to_value(value)?;
    store.save(key, &value)
}

fn check_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !key.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey {
            key: key.to_string(),
        })
    }
}

/// In-memory store, used in tests and when persistence is disabled.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    documents: RwLock<HashMap<String, Value>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty shared store.
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns the number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        check_key(key)?;
        Ok(self.documents.read().get(key).cloned())
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        check_key(key)?;
        self.documents.write().insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        check_key(key)?;
        Ok(self.documents.write().remove(key).is_some())
    }
}

/// Directory-backed store writing one pretty-printed JSON file per key.
///
/// Writes go to a temporary sibling file that is synced to disk and then
/// renamed over the target, so a crash or power loss leaves either the
/// previous document or the new one.
#[derive(Debug)]
pub struct FileStateStore {
    root: PathBuf,
    write_lock: parking_lot::Mutex<()>,
}

impl FileStateStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .map_err(|e| StorageError::write_error(root.display().to_string(), e.to_string()))?;
        Ok(Self {
            root,
            write_lock: parking_lot::Mutex::new(()),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        check_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }
}

/// Writes `content` and flushes it to disk before returning.
fn write_synced(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}

/// Flushes a rename to disk. Not every platform can open a directory for
/// syncing, so failures are only logged.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = std::fs::File::open(dir).and_then(|d| d.sync_all()) {
        tracing::warn!(dir = %dir.display(), error = %e, "Failed to sync state directory");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

impl StateStore for FileStateStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::read_error(
                    path.display().to_string(),
                    e.to_string(),
                ));
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StorageError::DeserializationError {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(value)?;

        let _guard = self.write_lock.lock();
        write_synced(&tmp, content.as_bytes())
            .map_err(|e| StorageError::write_error(tmp.display().to_string(), e.to_string()))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| StorageError::write_error(path.display().to_string(), e.to_string()))?;
        sync_dir(&self.root);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::IoError {
                operation: "delete".to_string(),
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
