use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CollectionRecord, Coordinates};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Emergency,
    Warning,
    #[default]
    Info,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Emergency => write!(f, "emergency"),
            AlertKind::Warning => write!(f, "warning"),
            AlertKind::Info => write!(f, "info"),
            AlertKind::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub message: String,
    #[serde(default)]
    pub coords: Option<Coordinates>,
    /// Server time; absent until the store has stamped the write.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type", default)]
    pub kind: AlertKind,
}

impl CollectionRecord for Alert {
    const COLLECTION: &'static str = "alerts";
}

impl Alert {
    pub fn is_emergency(&self) -> bool {
        self.kind == AlertKind::Emergency
    }
}

/// Payload for a new alert; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAlert {
    pub message: String,
    pub coords: Option<Coordinates>,
    #[serde(rename = "type")]
    pub kind: AlertKind,
}
