use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
