//! Sync client: mirrors, subscriptions, and write-through mutations.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{DocumentWrite, Mirror, RemoteStore, SyncError};
use crate::auth::AuthSession;
use crate::models::{
    Alert, CampusEvent, CollectionRecord, Incident, IncidentStatus, NewAlert, NewCampusEvent,
    NewIncident, PresenceEntry, Record, UserProfile,
};
use crate::presence::{PresenceSubscription, PresenceTracker};

/// Reporter recorded on incidents filed without a session.
const ANONYMOUS_REPORTER: &str = "anonymous";

/// Disposer for one standing collection listener.
///
/// `unsubscribe` consumes the handle, so a listener is torn down at most
/// once. Dropping an undisposed handle aborts the listener task as well.
pub struct Subscription {
    collection: &'static str,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    fn new(collection: &'static str, task: JoinHandle<()>) -> Self {
        Self {
            collection,
            task: Some(task),
        }
    }

    pub fn collection(&self) -> &'static str {
        self.collection
    }

    /// Stop the listener and wait until its task has let go of the stream.
    pub async fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // Cancelled is the expected outcome here.
            let _ = task.await;
            debug!(collection = self.collection, "Unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub struct SyncClient {
    remote: Arc<dyn RemoteStore>,
    session: RwLock<Option<AuthSession>>,
    alerts: Arc<Mirror<Alert>>,
    incidents: Arc<Mirror<Incident>>,
    events: Arc<Mirror<CampusEvent>>,
    presence: Arc<Mirror<PresenceEntry>>,
    users: Arc<Mirror<UserProfile>>,
}

impl SyncClient {
    pub fn new(remote: Arc<dyn RemoteStore>, session: Option<AuthSession>) -> Self {
        Self {
            remote,
            session: RwLock::new(session),
            alerts: Arc::new(Mirror::new()),
            incidents: Arc::new(Mirror::new()),
            events: Arc::new(Mirror::new()),
            presence: Arc::new(Mirror::new()),
            users: Arc::new(Mirror::new()),
        }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Apply an auth-state change.
    pub fn set_session(&self, session: Option<AuthSession>) {
        debug!(user_id = ?session.as_ref().map(|s| &s.user_id), "Session changed");
        *self.session.write().unwrap_or_else(|p| p.into_inner()) = session;
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.session
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn require_admin(&self, action: &str) -> Result<AuthSession, SyncError> {
        let session = self.session().ok_or(SyncError::NotAuthenticated)?;
        if !session.role.is_admin() {
            return Err(SyncError::Forbidden(format!("{} requires an admin account", action)));
        }
        Ok(session)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    async fn subscribe_to<T: CollectionRecord>(
        &self,
        mirror: &Arc<Mirror<T>>,
    ) -> Result<Subscription, SyncError> {
        let mut stream = self.remote.listen(T::COLLECTION).await?;
        let mirror = Arc::clone(mirror);

        let task = tokio::spawn(async move {
            while let Some(snapshot) = stream.next().await {
                mirror.apply(&snapshot);
            }
            debug!(collection = T::COLLECTION, "Snapshot stream ended");
        });

        info!(collection = T::COLLECTION, "Subscribed");
        Ok(Subscription::new(T::COLLECTION, task))
    }

    pub async fn subscribe_alerts(&self) -> Result<Subscription, SyncError> {
        self.subscribe_to(&self.alerts).await
    }

    pub async fn subscribe_incidents(&self) -> Result<Subscription, SyncError> {
        self.subscribe_to(&self.incidents).await
    }

    pub async fn subscribe_events(&self) -> Result<Subscription, SyncError> {
        self.subscribe_to(&self.events).await
    }

    pub async fn subscribe_users(&self) -> Result<Subscription, SyncError> {
        self.subscribe_to(&self.users).await
    }

    /// Mirror the presence collection and mark this session online.
    pub async fn subscribe_presence(&self) -> Result<PresenceSubscription, SyncError> {
        let subscription = self.subscribe_to(&self.presence).await?;
        let tracker = match self.session() {
            Some(session) => Some(PresenceTracker::start(Arc::clone(&self.remote), session).await?),
            None => {
                debug!("No session, presence will not be tracked");
                None
            }
        };
        Ok(PresenceSubscription::new(subscription, tracker))
    }

    // =========================================================================
    // Mirrors
    // =========================================================================

    pub fn alerts(&self) -> Arc<Vec<Record<Alert>>> {
        self.alerts.current()
    }

    pub fn incidents(&self) -> Arc<Vec<Record<Incident>>> {
        self.incidents.current()
    }

    pub fn events(&self) -> Arc<Vec<Record<CampusEvent>>> {
        self.events.current()
    }

    pub fn presence(&self) -> Arc<Vec<Record<PresenceEntry>>> {
        self.presence.current()
    }

    pub fn users(&self) -> Arc<Vec<Record<UserProfile>>> {
        self.users.current()
    }

    pub fn online_users(&self) -> Vec<Record<PresenceEntry>> {
        self.presence
            .current()
            .iter()
            .filter(|r| r.data.is_online)
            .cloned()
            .collect()
    }

    pub fn watch_alerts(&self) -> watch::Receiver<Arc<Vec<Record<Alert>>>> {
        self.alerts.watch()
    }

    pub fn watch_incidents(&self) -> watch::Receiver<Arc<Vec<Record<Incident>>>> {
        self.incidents.watch()
    }

    pub fn watch_events(&self) -> watch::Receiver<Arc<Vec<Record<CampusEvent>>>> {
        self.events.watch()
    }

    pub fn watch_presence(&self) -> watch::Receiver<Arc<Vec<Record<PresenceEntry>>>> {
        self.presence.watch()
    }

    /// Events whose reminder window contains `now`.
    pub fn due_event_reminders(&self, now: DateTime<Utc>) -> Vec<Record<CampusEvent>> {
        self.events
            .current()
            .iter()
            .filter(|r| r.data.reminder_due(now))
            .cloned()
            .collect()
    }

    // =========================================================================
    // Write-through mutations
    // =========================================================================

    pub async fn add_alert(&self, alert: NewAlert) -> Result<String, SyncError> {
        let session = self.require_admin("posting an alert")?;
        if alert.message.trim().is_empty() {
            return Err(SyncError::InvalidArgument("alert message is empty".to_string()));
        }

        let write = DocumentWrite::from_payload(&alert)?
            .field("createdBy", session.user_id.as_str())
            .server_timestamp("timestamp");
        let id = self.remote.add(Alert::COLLECTION, write).await?;
        info!(id = %id, kind = %alert.kind, "Alert posted");
        Ok(id)
    }

    pub async fn add_incident(&self, incident: NewIncident) -> Result<String, SyncError> {
        if incident.title.trim().is_empty() {
            return Err(SyncError::InvalidArgument("incident title is empty".to_string()));
        }
        let reporter = self
            .session()
            .map(|s| s.user_id)
            .unwrap_or_else(|| ANONYMOUS_REPORTER.to_string());
        let status = serde_json::to_value(IncidentStatus::Pending)?;

        let write = DocumentWrite::from_payload(&incident)?
            .field("reportedBy", reporter)
            .field("status", status)
            .server_timestamp("timestamp");
        let id = self.remote.add(Incident::COLLECTION, write).await?;
        info!(id = %id, "Incident reported");
        Ok(id)
    }

    pub async fn add_campus_event(&self, event: NewCampusEvent) -> Result<String, SyncError> {
        let session = self.require_admin("creating an event")?;
        if event.title.trim().is_empty() {
            return Err(SyncError::InvalidArgument("event title is empty".to_string()));
        }
        if event.end_time < event.start_time {
            return Err(SyncError::InvalidArgument(
                "event ends before it starts".to_string(),
            ));
        }
        if event.notification_lead_time < 0 {
            return Err(SyncError::InvalidArgument(
                "notification lead time must not be negative".to_string(),
            ));
        }

        let write = DocumentWrite::from_payload(&event)?
            .field("createdBy", session.user_id.as_str())
            .server_timestamp("createdAt");
        let id = self.remote.add(CampusEvent::COLLECTION, write).await?;
        info!(id = %id, title = %event.title, "Campus event created");
        Ok(id)
    }

    /// Atomically add `delta` to the signed-in user's points. Without a
    /// session this does nothing.
    pub async fn update_user_points(&self, delta: i64) -> Result<(), SyncError> {
        let Some(session) = self.session() else {
            debug!(delta, "No session, skipping points update");
            return Ok(());
        };
        self.remote
            .increment(UserProfile::COLLECTION, &session.user_id, "points", delta)
            .await?;
        debug!(user_id = %session.user_id, delta, "Points updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::TimeZone;
    use serde_json::{json, Map, Value};

    use crate::models::{AlertKind, Coordinates, Role};
    use crate::sync::MemoryRemoteStore;

    const WAIT: Duration = Duration::from_secs(2);

    fn session(role: Role) -> AuthSession {
        AuthSession {
            user_id: "u1".to_string(),
            email: "ada@campus.edu".to_string(),
            display_name: Some("Ada".to_string()),
            role,
            signed_in_at: Utc::now(),
        }
    }

    fn client(role: Option<Role>) -> (Arc<MemoryRemoteStore>, SyncClient) {
        let store = Arc::new(MemoryRemoteStore::new());
        let client = SyncClient::new(
            Arc::clone(&store) as Arc<dyn RemoteStore>,
            role.map(session),
        );
        (store, client)
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn new_alert(message: &str) -> NewAlert {
        NewAlert {
            message: message.to_string(),
            coords: Some(Coordinates::new(40.1, -88.2)),
            kind: AlertKind::Warning,
        }
    }

    /// Wait until the receiver's value satisfies `pred`.
    async fn wait_until<T, F>(rx: &mut watch::Receiver<T>, pred: F)
    where
        F: Fn(&T) -> bool,
    {
        tokio::time::timeout(WAIT, rx.wait_for(|v| pred(v)))
            .await
            .expect("timed out waiting for mirror")
            .expect("mirror closed");
    }

    #[tokio::test]
    async fn test_mirror_tracks_each_snapshot_exactly() {
        let (store, client) = client(None);
        let mut rx = client.watch_alerts();
        let sub = client.subscribe_alerts().await.unwrap();

        store.insert_raw("alerts", "a", fields(json!({"message": "one"})));
        store.insert_raw("alerts", "b", fields(json!({"message": "two"})));
        wait_until(&mut rx, |m| m.len() == 2).await;

        store.delete("alerts", "a");
        wait_until(&mut rx, |m| m.len() == 1).await;
        let ids: Vec<_> = client.alerts().iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec!["b"]);

        sub.unsubscribe().await;
    }

    #[tokio::test]
    async fn test_malformed_remote_documents_never_reach_mirror() {
        let (store, client) = client(None);
        let mut rx = client.watch_incidents();
        let _sub = client.subscribe_incidents().await.unwrap();

        store.insert_raw("incidents", "bad", fields(json!({"title": 7})));
        store.insert_raw(
            "incidents",
            "good",
            fields(json!({"title": "Broken light", "reportedBy": "u2"})),
        );
        wait_until(&mut rx, |m| m.iter().any(|r| r.id == "good")).await;
        assert_eq!(client.incidents().len(), 1);
    }

    #[tokio::test]
    async fn test_add_alert_round_trips_through_snapshot() {
        let (_store, client) = client(Some(Role::Admin));
        let mut rx = client.watch_alerts();
        let _sub = client.subscribe_alerts().await.unwrap();

        let id = client.add_alert(new_alert("Road closed")).await.unwrap();
        wait_until(&mut rx, |m| m.iter().any(|r| r.id == id)).await;

        let alerts = client.alerts();
        let alert = &alerts.iter().find(|r| r.id == id).unwrap().data;
        assert_eq!(alert.message, "Road closed");
        assert_eq!(alert.kind, AlertKind::Warning);
        assert!(alert.timestamp.is_some());
    }

    #[tokio::test]
    async fn test_add_alert_fails_when_unreachable_and_mirror_is_unchanged() {
        let (store, client) = client(Some(Role::Admin));
        let mut rx = client.watch_alerts();
        let _sub = client.subscribe_alerts().await.unwrap();
        store.insert_raw("alerts", "a", fields(json!({"message": "existing"})));
        wait_until(&mut rx, |m| m.len() == 1).await;

        store.set_reachable(false);
        let err = client.add_alert(new_alert("Lost")).await.unwrap_err();
        assert!(matches!(err, SyncError::Unavailable(_)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.alerts().len(), 1);
        assert_eq!(client.alerts()[0].id, "a");
    }

    #[tokio::test]
    async fn test_no_optimistic_insert() {
        let (_store, client) = client(Some(Role::Admin));
        // Not subscribed: the write lands remotely but the mirror stays empty.
        client.add_alert(new_alert("Quiet")).await.unwrap();
        assert!(client.alerts().is_empty());
    }

    #[tokio::test]
    async fn test_alerts_and_events_require_admin() {
        let (_store, anonymous) = client(None);
        assert!(matches!(
            anonymous.add_alert(new_alert("x")).await.unwrap_err(),
            SyncError::NotAuthenticated
        ));

        let (_store, student) = client(Some(Role::Student));
        assert!(matches!(
            student.add_alert(new_alert("x")).await.unwrap_err(),
            SyncError::Forbidden(_)
        ));
        let event = NewCampusEvent {
            title: "Open House".to_string(),
            description: String::new(),
            building_id: None,
            start_time: Utc::now(),
            end_time: Utc::now(),
            notification_lead_time: 10,
        };
        assert!(matches!(
            student.add_campus_event(event).await.unwrap_err(),
            SyncError::Forbidden(_)
        ));
    }

    #[tokio::test]
    async fn test_anonymous_incident_is_reported_as_anonymous() {
        let (store, client) = client(None);
        let id = client
            .add_incident(NewIncident {
                title: "Flooded stairwell".to_string(),
                description: "Basement of Grainger".to_string(),
                location: Some("Grainger Library".to_string()),
                coords: None,
            })
            .await
            .unwrap();

        let doc = store.document("incidents", &id).unwrap();
        assert_eq!(doc.get("reportedBy"), Some(&json!("anonymous")));
        assert_eq!(doc.get("status"), Some(&json!("pending")));
    }

    #[tokio::test]
    async fn test_event_validation() {
        let (_store, client) = client(Some(Role::Admin));
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 14, 0, 0).unwrap();
        let err = client
            .add_campus_event(NewCampusEvent {
                title: "Backwards".to_string(),
                description: String::new(),
                building_id: None,
                start_time: start,
                end_time: start - chrono::Duration::hours(1),
                notification_lead_time: 10,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_due_event_reminders() {
        let (store, client) = client(None);
        let mut rx = client.watch_events();
        let _sub = client.subscribe_events().await.unwrap();
        store.insert_raw(
            "events",
            "soon",
            fields(json!({
                "title": "Lecture",
                "startTime": "2026-09-01T14:00:00Z",
                "endTime": "2026-09-01T15:00:00Z",
                "notificationLeadTime": 30
            })),
        );
        store.insert_raw(
            "events",
            "later",
            fields(json!({
                "title": "Concert",
                "startTime": "2026-09-01T20:00:00Z",
                "endTime": "2026-09-01T22:00:00Z"
            })),
        );
        wait_until(&mut rx, |m| m.len() == 2).await;

        let now = Utc.with_ymd_and_hms(2026, 9, 1, 13, 45, 0).unwrap();
        let due = client.due_event_reminders(now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "soon");
    }

    #[tokio::test]
    async fn test_update_points_without_session_is_noop() {
        let (store, client) = client(None);
        client.update_user_points(10).await.unwrap();
        assert!(store.document("users", "u1").is_none());
    }

    #[tokio::test]
    async fn test_update_points_increments_current_user() {
        let (store, client) = client(Some(Role::Student));
        store.insert_raw("users", "u1", fields(json!({"email": "ada@campus.edu", "points": 5})));

        client.update_user_points(10).await.unwrap();
        client.update_user_points(-2).await.unwrap();
        assert_eq!(store.document("users", "u1").unwrap().get("points"), Some(&json!(13)));
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_listener() {
        let (store, client) = client(None);
        let sub = client.subscribe_events().await.unwrap();
        assert_eq!(sub.collection(), "events");
        assert_eq!(store.listener_count("events"), 1);

        sub.unsubscribe().await;
        assert_eq!(store.listener_count("events"), 0);
    }

    #[tokio::test]
    async fn test_session_change_applies_to_later_writes() {
        let (_store, client) = client(None);
        assert!(client.add_alert(new_alert("x")).await.is_err());
        client.set_session(Some(session(Role::Admin)));
        assert!(client.add_alert(new_alert("x")).await.is_ok());
    }
}
