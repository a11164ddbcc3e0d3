use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CollectionRecord, Coordinates};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    #[default]
    Pending,
    Investigating,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub coords: Option<Coordinates>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub reported_by: String,
    #[serde(default)]
    pub status: IncidentStatus,
}

impl CollectionRecord for Incident {
    const COLLECTION: &'static str = "incidents";
}

impl Incident {
    pub fn is_open(&self) -> bool {
        self.status != IncidentStatus::Resolved
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncident {
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub coords: Option<Coordinates>,
}
