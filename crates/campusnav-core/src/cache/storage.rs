use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::CacheError;
use crate::net::{Response, ResponseType};

/// A response as persisted in a cache file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub response_type: ResponseType,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(with = "base64_body")]
    pub body: Vec<u8>,
}

impl From<Response> for StoredResponse {
    fn from(response: Response) -> Self {
        Self {
            status: response.status,
            response_type: response.response_type,
            url: response.url,
            headers: response.headers,
            body: response.body,
        }
    }
}

impl From<StoredResponse> for Response {
    fn from(stored: StoredResponse) -> Self {
        Self {
            status: stored.status,
            response_type: stored.response_type,
            url: stored.url,
            headers: stored.headers,
            body: stored.body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub response: StoredResponse,
    pub generation: String,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, response: Response, generation: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            response: response.into(),
            generation: generation.into(),
            cached_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCache {
    name: String,
    entries: BTreeMap<String, CacheEntry>,
}

/// Named caches shared by every consumer of the same directory.
///
/// Each cache lives in its own JSON file. Read-modify-write cycles are
/// serialized by an internal lock; duplicate keys are last-write-wins.
pub struct CacheStorage {
    root: PathBuf,
    lock: Mutex<()>,
}

impl CacheStorage {
    pub fn new(root: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    /// Cache names map one-to-one onto file names, so anything outside
    /// `[A-Za-z0-9._-]` is rejected rather than rewritten.
    fn cache_path(&self, name: &str) -> Result<PathBuf, CacheError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
        if !valid {
            return Err(CacheError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(format!("{}.cache.json", name)))
    }

    fn read(&self, name: &str) -> Result<Option<StoredCache>, CacheError> {
        let path = self.cache_path(name)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write(&self, cache: &StoredCache) -> Result<(), CacheError> {
        let contents = serde_json::to_string(cache)?;
        std::fs::write(self.cache_path(&cache.name)?, contents)?;
        Ok(())
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create the named cache if it does not exist yet.
    pub fn open(&self, name: &str) -> Result<(), CacheError> {
        let _guard = self.guard();
        if self.read(name)?.is_none() {
            debug!(cache = name, "Creating cache");
            self.write(&StoredCache {
                name: name.to_string(),
                entries: BTreeMap::new(),
            })?;
        }
        Ok(())
    }

    pub fn has_cache(&self, name: &str) -> bool {
        self.cache_path(name).map(|p| p.exists()).unwrap_or(false)
    }

    /// Names of every cache currently in storage, sorted.
    pub fn cache_names(&self) -> Result<Vec<String>, CacheError> {
        let _guard = self.guard();
        let mut names = Vec::new();
        for dir_entry in std::fs::read_dir(&self.root)? {
            let path = dir_entry?.path();
            let is_cache_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(".cache.json"))
                .unwrap_or(false);
            if !is_cache_file {
                continue;
            }
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<StoredCache>(&contents) {
                Ok(cache) => names.push(cache.name),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable cache file");
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete a cache and all its entries. Returns whether it existed.
    pub fn delete_cache(&self, name: &str) -> Result<bool, CacheError> {
        let _guard = self.guard();
        let path = self.cache_path(name)?;
        if path.exists() {
            std::fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn match_request(&self, name: &str, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let _guard = self.guard();
        Ok(self
            .read(name)?
            .and_then(|mut cache| cache.entries.remove(key)))
    }

    pub fn put(&self, name: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.put_all(name, vec![entry])
    }

    /// Store several entries in one write, creating the cache if needed.
    pub fn put_all(&self, name: &str, entries: Vec<CacheEntry>) -> Result<(), CacheError> {
        let _guard = self.guard();
        let mut cache = self.read(name)?.unwrap_or_else(|| StoredCache {
            name: name.to_string(),
            entries: BTreeMap::new(),
        });
        for entry in entries {
            cache.entries.insert(entry.key.clone(), entry);
        }
        self.write(&cache)
    }

    /// Store `entry` only if the named cache still exists. Returns whether
    /// it was written. The existence check and the write share one lock.
    pub fn put_if_present(&self, name: &str, entry: CacheEntry) -> Result<bool, CacheError> {
        let _guard = self.guard();
        let Some(mut cache) = self.read(name)? else {
            return Ok(false);
        };
        cache.entries.insert(entry.key.clone(), entry);
        self.write(&cache)?;
        Ok(true)
    }

    pub fn entries(&self, name: &str) -> Result<Vec<CacheEntry>, CacheError> {
        let _guard = self.guard();
        Ok(self
            .read(name)?
            .map(|cache| cache.entries.into_values().collect())
            .unwrap_or_default())
    }
}

mod base64_body {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
