//! The application context, built once at startup.
//!
//! Every component gets its collaborators from here instead of looking them
//! up globally.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::auth::{AuthSession, Session};
use crate::cache::{CacheController, CacheStorage};
use crate::config::Config;
use crate::drafts::{DraftStore, LocalStore, Preferences};
use crate::geo;
use crate::models::{Building, Coordinates};
use crate::net::{Fetcher, HttpFetcher};
use crate::sync::{MemoryRemoteStore, RemoteStore, SyncClient};

/// Sub-directory holding cache generations
const CACHES_DIR: &str = "caches";

/// Local durable storage file
const LOCAL_STORAGE_FILE: &str = "local_storage.json";

pub struct AppContext {
    pub config: Config,
    pub data_dir: PathBuf,
    pub cache_storage: Arc<CacheStorage>,
    pub cache: Arc<CacheController>,
    pub sync: Arc<SyncClient>,
    pub drafts: Arc<DraftStore>,
    pub preferences: Arc<Preferences>,
}

impl AppContext {
    pub fn new(
        config: Config,
        data_dir: &Path,
        fetcher: Arc<dyn Fetcher>,
        remote: Arc<dyn RemoteStore>,
        session: Option<AuthSession>,
    ) -> Result<Self> {
        let cache_storage = Arc::new(
            CacheStorage::new(data_dir.join(CACHES_DIR)).context("Failed to open cache storage")?,
        );
        let cache = Arc::new(CacheController::from_config(
            &config,
            Arc::clone(&cache_storage),
            fetcher,
        ));
        let local = Arc::new(
            LocalStore::new(
                data_dir.join(LOCAL_STORAGE_FILE),
                config.local_storage_quota_bytes,
            )
            .context("Failed to open local storage")?,
        );

        debug!(data_dir = %data_dir.display(), generation = %cache.generation(), "App context ready");

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            cache_storage,
            cache,
            sync: Arc::new(SyncClient::new(remote, session)),
            drafts: Arc::new(DraftStore::new(Arc::clone(&local))),
            preferences: Arc::new(Preferences::new(local)),
            config,
        })
    }

    /// Build the default context: HTTP fetcher against the configured origin,
    /// in-process remote store, and the persisted session if any.
    pub fn from_config(config: Config) -> Result<Self> {
        let data_dir = config.cache_dir()?;
        let fetcher = Arc::new(HttpFetcher::new(config.origin.clone())?);

        let mut session = Session::new(data_dir.clone());
        if let Err(e) = session.load() {
            warn!(error = %e, "Failed to load session, continuing signed out");
        }

        Self::new(
            config,
            &data_dir,
            fetcher,
            Arc::new(MemoryRemoteStore::new()),
            session.data,
        )
    }

    pub fn is_within_campus(&self, point: Coordinates) -> bool {
        geo::is_within_campus(point, &self.config.campus)
    }

    pub fn building_at(&self, point: Coordinates) -> Option<&Building> {
        geo::building_by_coords(point, &self.config.campus.buildings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LifecycleState;
    use crate::models::GeofenceZone;
    use crate::net::testing::ScriptedFetcher;
    use crate::net::Request;

    #[tokio::test]
    async fn test_context_wires_cache_and_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.route("/", "shell");
        fetcher.route("/index.html", "index");

        let mut config = Config {
            manifest: vec!["/".to_string(), "/index.html".to_string()],
            ..Config::default()
        };
        config.campus.center = Coordinates::new(10.0, 10.0);
        config.campus.geofences.push(GeofenceZone {
            name: "campus".to_string(),
            center: Coordinates::new(10.0, 10.0),
            radius_meters: 500.0,
        });
        config.campus.buildings.push(Building {
            id: "gym".to_string(),
            name: "Gym".to_string(),
            coords: Coordinates::new(10.001, 10.001),
            category: None,
            description: None,
        });

        let ctx = AppContext::new(
            config,
            dir.path(),
            fetcher.clone(),
            Arc::new(MemoryRemoteStore::new()),
            None,
        )
        .unwrap();

        assert_eq!(ctx.cache.state(), LifecycleState::Uninstalled);
        ctx.cache.install_and_activate().await.unwrap();
        assert_eq!(ctx.cache_storage.cache_names().unwrap(), vec!["campus-nav-v1.0.0"]);

        fetcher.set_offline(true);
        let page = ctx.cache.handle_fetch(&Request::navigate("/map")).await.unwrap();
        assert_eq!(page.body, b"shell");

        assert!(ctx.is_within_campus(Coordinates::new(10.001, 10.001)));
        assert!(!ctx.is_within_campus(Coordinates::new(10.1, 10.0)));
        assert_eq!(ctx.building_at(Coordinates::new(10.001, 10.001)).map(|b| b.name.as_str()), Some("Gym"));
    }
}
