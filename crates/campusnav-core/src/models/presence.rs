use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CollectionRecord;

/// Liveness of one session, keyed by user id in the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl CollectionRecord for PresenceEntry {
    const COLLECTION: &'static str = "onlineUsers";
}
