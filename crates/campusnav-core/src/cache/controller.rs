//! Install / activate / serve lifecycle for one cache generation.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::{CacheEntry, CacheError, CacheStorage};
use crate::config::Config;
use crate::net::{Fetcher, Method, NetError, Request, Response, ResponseType};

/// Capacity of the lifecycle event channel.
/// Lagging receivers only miss old notifications, never block the controller.
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninstalled,
    Installing,
    /// Installed and waiting for the previous generation to let go.
    Installed,
    Activating,
    Active,
    /// Pruned by a newer generation; every request goes to the network.
    Redundant,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Uninstalled => write!(f, "uninstalled"),
            LifecycleState::Installing => write!(f, "installing"),
            LifecycleState::Installed => write!(f, "installed (waiting)"),
            LifecycleState::Activating => write!(f, "activating"),
            LifecycleState::Active => write!(f, "active"),
            LifecycleState::Redundant => write!(f, "redundant"),
        }
    }
}

/// Notifications for the running application about generation changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Installed { generation: String, entries: usize },
    /// A new generation is installed and waiting; the app may prompt to reload.
    UpdateWaiting { generation: String },
    InstallFailed { generation: String, reason: String },
    SkipWaiting { generation: String },
    Activated { generation: String, pruned: Vec<String> },
}

pub struct CacheController {
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    generation: String,
    manifest: Vec<String>,
    offline_fallback: String,
    state: Mutex<LifecycleState>,
    events: broadcast::Sender<LifecycleEvent>,
    pending_writes: tokio::sync::Mutex<JoinSet<()>>,
}

impl CacheController {
    /// Create a controller for `generation`, resuming its state from storage.
    pub fn new(
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        generation: impl Into<String>,
        manifest: Vec<String>,
        offline_fallback: impl Into<String>,
    ) -> Self {
        let generation = generation.into();
        let state = Self::resume_state(&storage, &generation);
        debug!(generation = %generation, %state, "Cache controller created");
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            storage,
            fetcher,
            generation,
            manifest,
            offline_fallback: offline_fallback.into(),
            state: Mutex::new(state),
            events,
            pending_writes: tokio::sync::Mutex::new(JoinSet::new()),
        }
    }

    pub fn from_config(config: &Config, storage: Arc<CacheStorage>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::new(
            storage,
            fetcher,
            config.cache_name(),
            config.manifest.clone(),
            config.offline_fallback.clone(),
        )
    }

    fn resume_state(storage: &CacheStorage, generation: &str) -> LifecycleState {
        match storage.cache_names() {
            Ok(names) if names.iter().any(|n| n == generation) => {
                if names.len() == 1 {
                    LifecycleState::Active
                } else {
                    LifecycleState::Installed
                }
            }
            Ok(_) => LifecycleState::Uninstalled,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate caches, starting uninstalled");
                LifecycleState::Uninstalled
            }
        }
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    /// Move to `next` if the current state is one of `allowed`.
    fn transition(
        &self,
        action: &'static str,
        allowed: &[LifecycleState],
        next: LifecycleState,
    ) -> Result<(), CacheError> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if !allowed.contains(&state) {
            return Err(CacheError::InvalidState {
                action,
                state: *state,
            });
        }
        *state = next;
        Ok(())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: LifecycleEvent) {
        // No receivers is fine; nobody is listening for updates yet.
        let _ = self.events.send(event);
    }

    // =========================================================================
    // Install
    // =========================================================================

    /// Fetch every manifest URL and store them under this generation.
    ///
    /// All-or-nothing: one failed fetch fails the install and nothing is
    /// written. Returns the number of cached entries.
    pub async fn install(&self) -> Result<usize, CacheError> {
        self.transition(
            "install",
            &[LifecycleState::Uninstalled, LifecycleState::Installed],
            LifecycleState::Installing,
        )?;
        info!(generation = %self.generation, urls = self.manifest.len(), "Installing cache generation");

        match self.populate().await {
            Ok(entries) => {
                self.set_state(LifecycleState::Installed);
                info!(generation = %self.generation, entries, "Cache generation installed");
                self.notify(LifecycleEvent::Installed {
                    generation: self.generation.clone(),
                    entries,
                });
                self.notify(LifecycleEvent::UpdateWaiting {
                    generation: self.generation.clone(),
                });
                Ok(entries)
            }
            Err(e) => {
                self.set_state(LifecycleState::Uninstalled);
                error!(generation = %self.generation, error = %e, "Cache install failed");
                self.notify(LifecycleEvent::InstallFailed {
                    generation: self.generation.clone(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn populate(&self) -> Result<usize, CacheError> {
        let fetches = self.manifest.iter().map(|url| async move {
            let request = Request::get(url.clone());
            let response = self
                .fetcher
                .fetch(&request)
                .await
                .map_err(|e| CacheError::InstallFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
            if !response.is_ok() {
                return Err(CacheError::InstallFailed {
                    url: url.clone(),
                    reason: NetError::from_status(response.status, url).to_string(),
                });
            }
            Ok(CacheEntry::new(request.cache_key(), response, self.generation.clone()))
        });

        let entries = futures::future::try_join_all(fetches).await?;
        let count = entries.len();
        self.storage.open(&self.generation)?;
        self.storage.put_all(&self.generation, entries)?;
        Ok(count)
    }

    // =========================================================================
    // Activate
    // =========================================================================

    /// Delete every cache generation other than this one. Returns the names
    /// of the pruned generations.
    pub async fn activate(&self) -> Result<Vec<String>, CacheError> {
        self.transition(
            "activate",
            &[LifecycleState::Installed],
            LifecycleState::Activating,
        )?;

        match self.prune() {
            Ok(pruned) => {
                self.set_state(LifecycleState::Active);
                info!(generation = %self.generation, pruned = ?pruned, "Cache generation activated");
                self.notify(LifecycleEvent::Activated {
                    generation: self.generation.clone(),
                    pruned: pruned.clone(),
                });
                Ok(pruned)
            }
            Err(e) => {
                self.set_state(LifecycleState::Installed);
                error!(generation = %self.generation, error = %e, "Cache activation failed");
                Err(e)
            }
        }
    }

    fn prune(&self) -> Result<Vec<String>, CacheError> {
        let mut pruned = Vec::new();
        for name in self.storage.cache_names()? {
            if name != self.generation {
                debug!(cache = %name, "Deleting stale cache generation");
                self.storage.delete_cache(&name)?;
                pruned.push(name);
            }
        }
        Ok(pruned)
    }

    /// Take over immediately instead of waiting for old consumers to go away.
    pub async fn skip_waiting(&self) -> Result<Vec<String>, CacheError> {
        self.notify(LifecycleEvent::SkipWaiting {
            generation: self.generation.clone(),
        });
        self.activate().await
    }

    /// Install and activate this generation. A no-op when it is already
    /// active.
    pub async fn install_and_activate(&self) -> Result<Vec<String>, CacheError> {
        if self.state() == LifecycleState::Active {
            info!(generation = %self.generation, "Cache generation already active");
            return Ok(Vec::new());
        }
        self.install().await?;
        self.skip_waiting().await
    }

    // =========================================================================
    // Serving
    // =========================================================================

    /// Answer a request cache-first with network fallback.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Response, NetError> {
        if request.method != Method::Get || !self.is_serving() {
            return self.fetcher.fetch(request).await;
        }

        if let Some(response) = self.lookup(request.cache_key()) {
            debug!(url = %request.url, "Cache hit");
            return Ok(response);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_ok() && response.response_type == ResponseType::Basic {
                    self.store_in_background(request.cache_key(), response.clone())
                        .await;
                }
                Ok(response)
            }
            Err(e) => {
                if request.is_navigation() {
                    if let Some(fallback) = self.lookup(&self.offline_fallback) {
                        info!(url = %request.url, error = %e, "Serving offline fallback document");
                        return Ok(fallback);
                    }
                }
                Err(e)
            }
        }
    }

    /// Whether this generation still answers from cache. An active
    /// generation whose cache was pruned by a newer one becomes redundant.
    fn is_serving(&self) -> bool {
        if self.state() != LifecycleState::Active {
            return false;
        }
        if self.storage.has_cache(&self.generation) {
            return true;
        }
        info!(generation = %self.generation, "Cache generation was replaced, passing requests through");
        self.set_state(LifecycleState::Redundant);
        false
    }

    /// Look up a key in the current generation. Storage errors count as a miss.
    fn lookup(&self, key: &str) -> Option<Response> {
        match self.storage.match_request(&self.generation, key) {
            Ok(entry) => entry.map(|e| e.response.into()),
            Err(e) => {
                warn!(key, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn store_in_background(&self, key: &str, response: Response) {
        let storage = Arc::clone(&self.storage);
        let entry = CacheEntry::new(key, response, self.generation.clone());
        let generation = self.generation.clone();

        let mut pending = self.pending_writes.lock().await;
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            match storage.put_if_present(&generation, entry) {
                Ok(true) => {}
                Ok(false) => debug!(cache = %generation, "Cache generation gone, write-through skipped"),
                Err(e) => warn!(cache = %generation, error = %e, "Write-through cache store dropped"),
            }
        });
    }

    /// Wait until every in-flight write-through store has finished.
    pub async fn wait_for_pending_writes(&self) {
        let mut pending = self.pending_writes.lock().await;
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Write-through cache task failed");
            }
        }
    }
}
