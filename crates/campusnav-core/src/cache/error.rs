use thiserror::Error;

use super::LifecycleState;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Install failed fetching {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    #[error("Invalid cache name '{0}': use letters, digits, '.', '-' or '_'")]
    InvalidName(String),

    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: LifecycleState,
    },

    #[error("Cache storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
