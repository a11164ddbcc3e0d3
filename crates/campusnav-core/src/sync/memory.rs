//! In-process remote store with push listeners.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::StreamExt;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{Map, Value};
use tracing::debug;

use super::{DocumentWrite, RemoteDocument, RemoteStore, Snapshot, SnapshotStream, SyncError};

/// Length of generated document ids.
const AUTO_ID_LENGTH: usize = 20;

type Documents = BTreeMap<String, Map<String, Value>>;

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Documents>,
    listeners: HashMap<String, Vec<UnboundedSender<Snapshot>>>,
}

impl Inner {
    fn snapshot(&self, collection: &str) -> Snapshot {
        let documents = self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| RemoteDocument {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Snapshot {
            collection: collection.to_string(),
            documents,
        }
    }

    /// Push the current snapshot to every live listener, forgetting closed ones.
    fn emit(&mut self, collection: &str) {
        let snapshot = self.snapshot(collection);
        if let Some(listeners) = self.listeners.get_mut(collection) {
            listeners.retain(|tx| tx.unbounded_send(snapshot.clone()).is_ok());
        }
    }
}

/// A remote store that lives in memory.
///
/// Every mutation pushes a full snapshot to the listeners of the touched
/// collection, in mutation order. Reachability can be switched off to
/// simulate losing the network; writes then fail with `Unavailable`.
pub struct MemoryRemoteStore {
    inner: Mutex<Inner>,
    reachable: AtomicBool,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            reachable: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_reachable(&self, reachable: bool) {
        debug!(reachable, "Memory remote store reachability changed");
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn ensure_reachable(&self) -> Result<(), SyncError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::Unavailable("remote store is unreachable".to_string()))
        }
    }

    /// Number of open listeners on `collection`.
    pub fn listener_count(&self, collection: &str) -> usize {
        let mut inner = self.lock();
        match inner.listeners.get_mut(collection) {
            Some(listeners) => {
                listeners.retain(|tx| !tx.is_closed());
                listeners.len()
            }
            None => 0,
        }
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<Map<String, Value>> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Store a raw document as-is, bypassing any shape the client expects.
    pub fn insert_raw(&self, collection: &str, id: &str, fields: Map<String, Value>) {
        let mut inner = self.lock();
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        inner.emit(collection);
    }

    pub fn delete(&self, collection: &str, id: &str) -> bool {
        let mut inner = self.lock();
        let removed = inner
            .collections
            .get_mut(collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false);
        if removed {
            inner.emit(collection);
        }
        removed
    }

    fn stamp(write: DocumentWrite) -> Map<String, Value> {
        let mut fields = write.fields;
        let now = Utc::now().to_rfc3339();
        for name in write.server_timestamps {
            fields.insert(name, Value::String(now.clone()));
        }
        fields
    }

    fn auto_id() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(AUTO_ID_LENGTH)
            .map(char::from)
            .collect()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn listen(&self, collection: &str) -> Result<SnapshotStream, SyncError> {
        let (tx, rx) = mpsc::unbounded();
        let mut inner = self.lock();
        let initial = inner.snapshot(collection);
        // Receiver is alive, so the first send cannot fail.
        let _ = tx.unbounded_send(initial);
        inner
            .listeners
            .entry(collection.to_string())
            .or_default()
            .push(tx);
        debug!(collection, "Listener attached");
        Ok(rx.boxed())
    }

    async fn add(&self, collection: &str, write: DocumentWrite) -> Result<String, SyncError> {
        self.ensure_reachable()?;
        let id = Self::auto_id();
        let fields = Self::stamp(write);
        let mut inner = self.lock();
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        inner.emit(collection);
        Ok(id)
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
        merge: bool,
    ) -> Result<(), SyncError> {
        self.ensure_reachable()?;
        let fields = Self::stamp(write);
        let mut inner = self.lock();
        let docs = inner.collections.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(existing) if merge => existing.extend(fields),
            _ => {
                docs.insert(id.to_string(), fields);
            }
        }
        inner.emit(collection);
        Ok(())
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), SyncError> {
        self.ensure_reachable()?;
        let mut inner = self.lock();
        let doc = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| SyncError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        // Missing or non-numeric fields are replaced by `delta`; floats stay floats.
        let next = match doc.get(field) {
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => {
                let current = n.as_i64().ok_or_else(|| {
                    SyncError::InvalidArgument(format!("{} is out of range for an increment", field))
                })?;
                let sum = current.checked_add(delta).ok_or_else(|| {
                    SyncError::InvalidArgument(format!("incrementing {} by {} overflows", field, delta))
                })?;
                Value::from(sum)
            }
            Some(Value::Number(n)) => Value::from(n.as_f64().unwrap_or(0.0) + delta as f64),
            _ => Value::from(delta),
        };
        doc.insert(field.to_string(), next);
        inner.emit(collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_listen_delivers_initial_and_change_snapshots() {
        let store = MemoryRemoteStore::new();
        let mut stream = store.listen("alerts").await.unwrap();

        let initial = stream.next().await.unwrap();
        assert!(initial.documents.is_empty());

        let id = store
            .add("alerts", DocumentWrite::new().field("message", "hi").server_timestamp("timestamp"))
            .await
            .unwrap();
        let next = stream.next().await.unwrap();
        assert_eq!(next.documents.len(), 1);
        assert_eq!(next.documents[0].id, id);
        assert!(next.documents[0].fields.get("timestamp").unwrap().is_string());
    }

    #[tokio::test]
    async fn test_writes_fail_when_unreachable() {
        let store = MemoryRemoteStore::new();
        store.set_reachable(false);
        let err = store.add("alerts", DocumentWrite::new()).await.unwrap_err();
        assert!(matches!(err, SyncError::Unavailable(_)));
        assert!(store.lock().collections.is_empty());
    }

    #[tokio::test]
    async fn test_set_merge_keeps_existing_fields() {
        let store = MemoryRemoteStore::new();
        store.insert_raw("onlineUsers", "u1", fields(json!({"isOnline": true, "email": "a@b.edu"})));
        store
            .set("onlineUsers", "u1", DocumentWrite::new().field("isOnline", false), true)
            .await
            .unwrap();
        let doc = store.document("onlineUsers", "u1").unwrap();
        assert_eq!(doc.get("isOnline"), Some(&json!(false)));
        assert_eq!(doc.get("email"), Some(&json!("a@b.edu")));

        store
            .set("onlineUsers", "u1", DocumentWrite::new().field("isOnline", true), false)
            .await
            .unwrap();
        assert!(store.document("onlineUsers", "u1").unwrap().get("email").is_none());
    }

    #[tokio::test]
    async fn test_increment_requires_existing_document() {
        let store = MemoryRemoteStore::new();
        let err = store.increment("users", "ghost", "points", 5).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));

        store.insert_raw("users", "u1", fields(json!({"points": 10})));
        store.increment("users", "u1", "points", 5).await.unwrap();
        store.increment("users", "u1", "points", -3).await.unwrap();
        assert_eq!(store.document("users", "u1").unwrap().get("points"), Some(&json!(12)));
    }

    #[tokio::test]
    async fn test_increment_overflow_leaves_value_untouched() {
        let store = MemoryRemoteStore::new();
        store.insert_raw("users", "u1", fields(json!({"points": i64::MAX})));

        let err = store.increment("users", "u1", "points", 1).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
        assert_eq!(
            store.document("users", "u1").unwrap().get("points"),
            Some(&json!(i64::MAX))
        );
    }

    #[tokio::test]
    async fn test_increment_keeps_float_and_replaces_non_numeric() {
        let store = MemoryRemoteStore::new();
        store.insert_raw("users", "u1", fields(json!({"points": 1.5, "badge": "gold"})));

        store.increment("users", "u1", "points", 2).await.unwrap();
        store.increment("users", "u1", "badge", 4).await.unwrap();

        let doc = store.document("users", "u1").unwrap();
        assert_eq!(doc.get("points"), Some(&json!(3.5)));
        assert_eq!(doc.get("badge"), Some(&json!(4)));
    }

    #[tokio::test]
    async fn test_dropped_stream_releases_listener() {
        let store = MemoryRemoteStore::new();
        let stream = store.listen("events").await.unwrap();
        assert_eq!(store.listener_count("events"), 1);
        drop(stream);
        assert_eq!(store.listener_count("events"), 0);
    }
}
