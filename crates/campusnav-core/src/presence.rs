//! Session liveness in the remote store.
//!
//! Starting a tracker marks the user online, stopping it marks them offline.
//! There is no heartbeat: a client that dies without stopping leaves its
//! entry online.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::AuthSession;
use crate::models::{CollectionRecord, PresenceEntry};
use crate::sync::{DocumentWrite, RemoteStore, Subscription, SyncError};

pub struct PresenceTracker {
    remote: Arc<dyn RemoteStore>,
    session: AuthSession,
}

impl PresenceTracker {
    /// Upsert `{isOnline: true, lastSeen: now}` for the session's user.
    pub async fn start(remote: Arc<dyn RemoteStore>, session: AuthSession) -> Result<Self, SyncError> {
        let mut write = DocumentWrite::new()
            .field("isOnline", true)
            .field("email", session.email.as_str())
            .server_timestamp("lastSeen");
        if let Some(name) = &session.display_name {
            write = write.field("displayName", name.as_str());
        }
        remote
            .set(PresenceEntry::COLLECTION, &session.user_id, write, true)
            .await?;
        info!(user_id = %session.user_id, "Presence online");
        Ok(Self { remote, session })
    }

    pub fn user_id(&self) -> &str {
        &self.session.user_id
    }

    /// Upsert `{isOnline: false, lastSeen: now}`.
    pub async fn stop(self) -> Result<(), SyncError> {
        let write = DocumentWrite::new()
            .field("isOnline", false)
            .server_timestamp("lastSeen");
        self.remote
            .set(PresenceEntry::COLLECTION, &self.session.user_id, write, true)
            .await?;
        info!(user_id = %self.session.user_id, "Presence offline");
        Ok(())
    }
}

/// Presence mirror listener plus the tracker for this session.
pub struct PresenceSubscription {
    subscription: Option<Subscription>,
    tracker: Option<PresenceTracker>,
}

impl PresenceSubscription {
    pub(crate) fn new(subscription: Subscription, tracker: Option<PresenceTracker>) -> Self {
        Self {
            subscription: Some(subscription),
            tracker,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_some()
    }

    /// Stop listening, then mark the session offline.
    pub async fn unsubscribe(mut self) -> Result<(), SyncError> {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe().await;
        }
        match self.tracker.take() {
            Some(tracker) => tracker.stop().await,
            None => {
                debug!("Presence unsubscribed without a tracked session");
                Ok(())
            }
        }
    }
}

impl Drop for PresenceSubscription {
    fn drop(&mut self) {
        if let Some(tracker) = &self.tracker {
            warn!(
                user_id = %tracker.user_id(),
                "Presence dropped without unsubscribe; entry stays online"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures::StreamExt;
    use serde_json::json;

    use crate::models::Role;
    use crate::sync::{MemoryRemoteStore, SyncClient};

    fn session() -> AuthSession {
        AuthSession {
            user_id: "u1".to_string(),
            email: "ada@campus.edu".to_string(),
            display_name: Some("Ada".to_string()),
            role: Role::Student,
            signed_in_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_presence_brackets_online_then_offline() {
        let store = Arc::new(MemoryRemoteStore::new());
        let mut history = store.listen("onlineUsers").await.unwrap();
        let client = SyncClient::new(Arc::clone(&store) as Arc<dyn RemoteStore>, Some(session()));

        let presence = client.subscribe_presence().await.unwrap();
        assert!(presence.is_tracking());
        presence.unsubscribe().await.unwrap();

        let mut states = Vec::new();
        // initial empty snapshot, online write, offline write
        for _ in 0..3 {
            let snapshot = history.next().await.unwrap();
            if let Some(doc) = snapshot.documents.iter().find(|d| d.id == "u1") {
                states.push(doc.fields.get("isOnline").cloned());
            }
        }
        assert_eq!(states, vec![Some(json!(true)), Some(json!(false))]);

        let final_doc = store.document("onlineUsers", "u1").unwrap();
        assert_eq!(final_doc.get("isOnline"), Some(&json!(false)));
        assert_eq!(final_doc.get("displayName"), Some(&json!("Ada")));
        assert!(final_doc.get("lastSeen").is_some());
        assert_eq!(store.listener_count("onlineUsers"), 1);
    }

    #[tokio::test]
    async fn test_presence_without_session_writes_nothing() {
        let store = Arc::new(MemoryRemoteStore::new());
        let client = SyncClient::new(Arc::clone(&store) as Arc<dyn RemoteStore>, None);

        let presence = client.subscribe_presence().await.unwrap();
        assert!(!presence.is_tracking());
        presence.unsubscribe().await.unwrap();
        assert!(store.document("onlineUsers", "u1").is_none());
    }

    #[tokio::test]
    async fn test_dropped_subscription_leaves_entry_online() {
        let store = Arc::new(MemoryRemoteStore::new());
        let client = SyncClient::new(Arc::clone(&store) as Arc<dyn RemoteStore>, Some(session()));

        drop(client.subscribe_presence().await.unwrap());
        let doc = store.document("onlineUsers", "u1").unwrap();
        assert_eq!(doc.get("isOnline"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_presence_start_fails_when_unreachable() {
        let store = Arc::new(MemoryRemoteStore::new());
        store.set_reachable(false);
        let err = PresenceTracker::start(Arc::clone(&store) as Arc<dyn RemoteStore>, session())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::Unavailable(_)));
    }
}
