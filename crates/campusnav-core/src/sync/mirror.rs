use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::Snapshot;
use crate::models::{CollectionRecord, Record};

/// Local copy of one remote collection.
///
/// Each snapshot replaces the whole record set in one swap, so readers see
/// either the previous snapshot or the next one, never a mix.
pub struct Mirror<T> {
    tx: watch::Sender<Arc<Vec<Record<T>>>>,
}

impl<T: CollectionRecord> Default for Mirror<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CollectionRecord> Mirror<T> {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(Vec::new()));
        Self { tx }
    }

    pub fn current(&self) -> Arc<Vec<Record<T>>> {
        self.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<Vec<Record<T>>>> {
        self.tx.subscribe()
    }

    pub fn replace(&self, records: Vec<Record<T>>) {
        self.tx.send_replace(Arc::new(records));
    }

    /// Decode a snapshot and make it the mirror's contents.
    pub fn apply(&self, snapshot: &Snapshot) {
        let records = decode_snapshot::<T>(snapshot);
        debug!(
            collection = T::COLLECTION,
            received = snapshot.documents.len(),
            kept = records.len(),
            "Mirror replaced"
        );
        self.replace(records);
    }
}

/// Decode every document, dropping the ones that do not fit `T`.
pub fn decode_snapshot<T: CollectionRecord>(snapshot: &Snapshot) -> Vec<Record<T>> {
    snapshot
        .documents
        .iter()
        .filter_map(|doc| {
            match serde_json::from_value::<T>(Value::Object(doc.fields.clone())) {
                Ok(data) => Some(Record::new(doc.id.clone(), data)),
                Err(e) => {
                    warn!(
                        collection = T::COLLECTION,
                        id = %doc.id,
                        error = %e,
                        "Dropping malformed document"
                    );
                    None
                }
            }
        })
        .collect()
}
