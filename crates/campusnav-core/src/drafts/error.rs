use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Local storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Local storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Local storage quota exceeded: {needed} bytes needed, quota is {quota}")]
    QuotaExceeded { needed: u64, quota: u64 },
}

#[derive(Error, Debug)]
pub enum DraftError {
    #[error("Only image files are allowed, got '{0}'")]
    InvalidMimeType(String),

    #[error("Image is {size} bytes; the limit is {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("Stored image payload is corrupt: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
