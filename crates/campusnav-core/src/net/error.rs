use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Network unreachable: {0}")]
    Offline(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unexpected status {status} for {url}")]
    Status { status: u16, url: String },
}

/// Maximum length for URLs embedded in error messages
const MAX_URL_LENGTH: usize = 200;

impl NetError {
    fn truncate_url(url: &str) -> String {
        if url.len() <= MAX_URL_LENGTH {
            url.to_string()
        } else {
            let cut: String = url.chars().take(MAX_URL_LENGTH).collect();
            format!("{}... (truncated)", cut)
        }
    }

    /// Classify a non-success status into an error.
    pub fn from_status(status: u16, url: &str) -> Self {
        NetError::Status {
            status,
            url: Self::truncate_url(url),
        }
    }
}
