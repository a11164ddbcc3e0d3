use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::CollectionRecord;

/// Minutes before the start time a reminder is due when none is set.
const DEFAULT_NOTIFICATION_LEAD_MINUTES: i64 = 15;

fn default_lead_time() -> i64 {
    DEFAULT_NOTIFICATION_LEAD_MINUTES
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampusEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub building_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Minutes before `start_time` to remind attendees.
    #[serde(default = "default_lead_time")]
    pub notification_lead_time: i64,
}

impl CollectionRecord for CampusEvent {
    const COLLECTION: &'static str = "events";
}

impl CampusEvent {
    pub fn reminder_at(&self) -> DateTime<Utc> {
        self.start_time - Duration::minutes(self.notification_lead_time)
    }

    /// True inside the window `[start - lead, start)`.
    pub fn reminder_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.reminder_at() && now < self.start_time
    }

    pub fn is_happening(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time && now < self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCampusEvent {
    pub title: String,
    pub description: String,
    pub building_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub notification_lead_time: i64,
}
