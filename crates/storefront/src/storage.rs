//! Durable client-side key/value storage.
//!
//! The cart engine mirrors its items here so a cart survives an expired
//! commerce session, and the commerce client keeps its session token here.
//! Writes are best effort: callers log a failed write and carry on with the
//! in-memory state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;

/// Well-known storage keys.
pub mod keys {
    /// JSON array of persisted cart items.
    pub const CART_ITEMS: &str = "np.cart.items";
    /// Session token issued by the commerce platform.
    pub const AUTH_TOKEN: &str = "np.auth.token";
}

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Synchronous string key/value store.
pub trait LocalStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not persist the value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not persist the removal.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local store. Used by tests and by hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
///
/// The whole file is rewritten on every change; the values held here are a
/// handful of small strings.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: RwLock<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    fn flush(&self, values: &HashMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_string(values)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_owned(), value.to_owned());
        self.flush(&values)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("np-store-{name}-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get(keys::AUTH_TOKEN), None);

        store.set(keys::AUTH_TOKEN, "tok_1").unwrap();
        assert_eq!(store.get(keys::AUTH_TOKEN).as_deref(), Some("tok_1"));

        store.remove(keys::AUTH_TOKEN).unwrap();
        assert_eq!(store.get(keys::AUTH_TOKEN), None);
        store.remove(keys::AUTH_TOKEN).unwrap();
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let path = temp_path("reopen");
        {
            let store = FileStore::open(&path).unwrap();
            store.set(keys::CART_ITEMS, "[]").unwrap();
            store.set(keys::AUTH_TOKEN, "tok_2").unwrap();
            store.remove(keys::AUTH_TOKEN).unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(keys::CART_ITEMS).as_deref(), Some("[]"));
        assert_eq!(reopened.get(keys::AUTH_TOKEN), None);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            FileStore::open(&path),
            Err(StorageError::Corrupt(_))
        ));

        std::fs::remove_file(path).unwrap();
    }
}
