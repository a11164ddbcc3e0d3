use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::StorageError;

/// Prefix applied to every key so several apps can share one file.
const KEY_PREFIX: &str = "campusnav:";

/// String key/value storage persisted as one JSON file.
///
/// Values are JSON-serialized before storing. Every mutation rewrites the
/// whole file; the optional quota counts key and value bytes.
pub struct LocalStore {
    path: PathBuf,
    quota_bytes: Option<u64>,
    lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(path: PathBuf, quota_bytes: Option<u64>) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            quota_bytes,
            lock: Mutex::new(()),
        })
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn namespaced(key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_all(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let contents = serde_json::to_string(items)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    fn size_of(items: &BTreeMap<String, String>) -> u64 {
        items.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let _guard = self.guard();
        match self.read_all()?.get(&Self::namespaced(key)) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    /// Store `value` under `key`, failing without mutation if the quota
    /// would be exceeded.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        let _guard = self.guard();
        let mut items = self.read_all()?;
        items.insert(Self::namespaced(key), raw);

        if let Some(quota) = self.quota_bytes {
            let needed = Self::size_of(&items);
            if needed > quota {
                debug!(key, needed, quota, "Local storage quota exceeded");
                return Err(StorageError::QuotaExceeded { needed, quota });
            }
        }
        self.write_all(&items)
    }

    /// Read, modify and write `key` under one guard.
    ///
    /// `apply` receives the current value (if any) and returns the value to
    /// store plus a result for the caller. Quota failures leave the stored
    /// value untouched.
    pub fn update<T, R, F>(&self, key: &str, apply: F) -> Result<R, StorageError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> (T, R),
    {
        let _guard = self.guard();
        let mut items = self.read_all()?;
        let namespaced = Self::namespaced(key);
        let current = match items.get(&namespaced) {
            Some(raw) => Some(serde_json::from_str(raw)?),
            None => None,
        };

        let (value, result) = apply(current);
        items.insert(namespaced, serde_json::to_string(&value)?);

        if let Some(quota) = self.quota_bytes {
            let needed = Self::size_of(&items);
            if needed > quota {
                debug!(key, needed, quota, "Local storage quota exceeded");
                return Err(StorageError::QuotaExceeded { needed, quota });
            }
        }
        self.write_all(&items)?;
        Ok(result)
    }

    pub fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let _guard = self.guard();
        let mut items = self.read_all()?;
        let removed = items.remove(&Self::namespaced(key)).is_some();
        if removed {
            self.write_all(&items)?;
        }
        Ok(removed)
    }

    pub fn used_bytes(&self) -> Result<u64, StorageError> {
        let _guard = self.guard();
        Ok(Self::size_of(&self.read_all()?))
    }
}
