//! Campusnav core - the offline cache and realtime sync layer of the campus
//! navigation app.
//!
//! - `cache`: versioned asset cache and its install/activate/serve lifecycle
//! - `sync`: remote collection listeners, local mirrors, write-through mutations
//! - `presence`: session liveness in the remote store
//! - `drafts`: client-side durable storage for images and preferences
//! - `context`: the application context wiring everything together

pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod drafts;
pub mod geo;
pub mod models;
pub mod net;
pub mod presence;
pub mod sync;
pub mod utils;

pub use cache::{CacheController, CacheError, CacheStorage, LifecycleEvent, LifecycleState};
pub use config::Config;
pub use context::AppContext;
pub use drafts::{DraftError, DraftStore, LocalStore};
pub use net::{Fetcher, HttpFetcher, NetError, Request, Response};
pub use presence::{PresenceSubscription, PresenceTracker};
pub use sync::{MemoryRemoteStore, RemoteStore, Subscription, SyncClient, SyncError};
