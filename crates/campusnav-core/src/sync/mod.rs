//! Realtime synchronization with the remote document store.
//!
//! This module provides:
//! - `RemoteStore`: the collaborator seam (listen / add / set / increment)
//! - `MemoryRemoteStore`: an in-process store with push listeners
//! - `Mirror`: a local copy of one collection, replaced wholesale per snapshot
//! - `SyncClient`: owns the mirrors, their subscriptions, and write-through
//!   mutations
//!
//! Writes are never applied locally. A new record shows up in a mirror only
//! once the store pushes the next snapshot.

pub mod client;
pub mod error;
pub mod memory;
pub mod mirror;
pub mod remote;

pub use client::{Subscription, SyncClient};
pub use error::SyncError;
pub use memory::MemoryRemoteStore;
pub use mirror::Mirror;
pub use remote::{DocumentWrite, RemoteDocument, RemoteStore, Snapshot, SnapshotStream};
