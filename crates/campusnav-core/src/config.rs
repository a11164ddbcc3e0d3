//! Application configuration management.
//!
//! Holds the deploy-time settings of the cache layer (app name, version,
//! origin, asset manifest) and the campus geometry used by the geofence
//! helpers.
//!
//! Configuration is stored at `~/.config/campusnav/config.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{Building, Coordinates, GeofenceZone};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "campusnav";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default byte quota for local durable storage, mirroring browser limits.
const DEFAULT_LOCAL_STORAGE_QUOTA: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app_name: String,
    pub version: String,
    /// Origin the app shell is served from; responses from it are "basic".
    pub origin: String,
    /// URLs that must all be cached for an install to succeed.
    pub manifest: Vec<String>,
    /// Document served to navigation requests when the network is down.
    pub offline_fallback: String,
    pub local_storage_quota_bytes: Option<u64>,
    pub campus: CampusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CampusConfig {
    pub center: Coordinates,
    pub geofences: Vec<GeofenceZone>,
    pub buildings: Vec<Building>,
}

impl Default for CampusConfig {
    fn default() -> Self {
        Self {
            center: Coordinates::new(0.0, 0.0),
            geofences: Vec::new(),
            buildings: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "campus-nav".to_string(),
            version: "v1.0.0".to_string(),
            origin: "http://localhost:3000".to_string(),
            manifest: default_manifest(),
            offline_fallback: "/".to_string(),
            local_storage_quota_bytes: Some(DEFAULT_LOCAL_STORAGE_QUOTA),
            campus: CampusConfig::default(),
        }
    }
}

fn default_manifest() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/manifest.json",
        "/favicon.ico",
        "/logo192.png",
        "/logo512.png",
        "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css",
        "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Ok(serde_json::from_str(&contents).context("Failed to parse config file")?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `CAMPUSNAV_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(origin) = std::env::var("CAMPUSNAV_ORIGIN") {
            self.origin = origin;
        }
        if let Ok(version) = std::env::var("CAMPUSNAV_VERSION") {
            self.version = version;
        }
        self
    }

    /// The cache generation name. Changing it is the only way to roll a new
    /// generation and prune the old ones.
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.app_name, self.version)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
