//! Versioned asset cache for offline access.
//!
//! This module provides:
//! - `CacheStorage`: named caches persisted as JSON files, one per generation
//! - `CacheController`: the install / activate / serve lifecycle over a single
//!   generation, answering requests cache-first with network fallback
//!
//! A generation is identified by its cache name (`<app-name>-<version>`).
//! Activating a generation deletes every other one, so at most one set of
//! entries survives a deploy.

pub mod controller;
pub mod error;
pub mod storage;

pub use controller::{CacheController, LifecycleEvent, LifecycleState};
pub use error::CacheError;
pub use storage::{CacheEntry, CacheStorage, StoredResponse};
