use serde::de::DeserializeOwned;
use serde::Serialize;

/// A type mirrored from a named remote collection.
pub trait CollectionRecord: DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;
}

/// A decoded remote document. `id` is assigned by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record<T> {
    pub id: String,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Record<T> {
    pub fn new(id: impl Into<String>, data: T) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}
