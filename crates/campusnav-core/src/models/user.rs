use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CollectionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Staff,
    Admin,
    #[default]
    #[serde(other)]
    Student,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        *self == Role::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl CollectionRecord for UserProfile {
    const COLLECTION: &'static str = "users";
}
