//! Client-side durable storage.
//!
//! This module provides:
//! - `LocalStore`: namespaced key/value storage of JSON values in one file,
//!   with an optional byte quota
//! - `DraftStore`: user images kept locally, never synced remotely
//! - `Preferences`: accessibility settings and theme

pub mod error;
pub mod local;
pub mod preferences;
pub mod store;

pub use error::{DraftError, StorageError};
pub use local::LocalStore;
pub use preferences::{style_classes, AccessibilitySettings, Preferences, Theme};
pub use store::{DraftFile, DraftStore, ImageCategory, LocalDraftImage, MAX_IMAGE_BYTES};
