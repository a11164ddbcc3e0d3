use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::{Map, Value};

use super::SyncError;

/// A document as delivered by the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub id: String,
    pub fields: Map<String, Value>,
}

/// The full contents of a collection at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub collection: String,
    pub documents: Vec<RemoteDocument>,
}

pub type SnapshotStream = BoxStream<'static, Snapshot>;

/// Fields to write, plus the names of fields the store stamps with its own
/// clock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentWrite {
    pub fields: Map<String, Value>,
    pub server_timestamps: Vec<String>,
}

impl DocumentWrite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a payload that serializes to a JSON object.
    pub fn from_payload<T: Serialize>(payload: &T) -> Result<Self, SyncError> {
        match serde_json::to_value(payload)? {
            Value::Object(fields) => Ok(Self {
                fields,
                server_timestamps: Vec::new(),
            }),
            other => Err(SyncError::InvalidArgument(format!(
                "document payload must be an object, got {}",
                other
            ))),
        }
    }

    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn server_timestamp(mut self, name: &str) -> Self {
        self.server_timestamps.push(name.to_string());
        self
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Open a standing listener. The stream yields a full snapshot first and
    /// after every change. Dropping the stream releases the listener.
    async fn listen(&self, collection: &str) -> Result<SnapshotStream, SyncError>;

    /// Append a document and return its store-assigned id.
    async fn add(&self, collection: &str, write: DocumentWrite) -> Result<String, SyncError>;

    /// Create or overwrite a document; with `merge` existing fields survive.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
        merge: bool,
    ) -> Result<(), SyncError>;

    /// Atomically add `delta` to a numeric field of an existing document.
    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), SyncError>;
}
