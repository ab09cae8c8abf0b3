//! Worker configuration.
//!
//! One `WorkerConfig` is built at worker startup and handed to every
//! component. Cache names are derived from it, so bumping `version`
//! retires every cache of the previous generation on the next activation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{SwError, SwResult};

/// Google Fonts stylesheet cached at install time.
pub const FONT_STYLESHEET_URL: &str =
    "https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600;700&display=swap";

/// Service worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Prefix for cache names.
    pub app_name: String,

    /// Version token embedded in cache names and reported to pages.
    pub version: String,

    /// Origin of the pages this worker controls.
    pub origin: Url,

    /// Shell assets cached at install. Relative entries resolve against `origin`.
    pub manifest: Vec<String>,

    /// Path of the offline fallback document.
    pub offline_path: String,

    /// Hosts whose URLs are treated as web fonts, even cross-origin.
    pub font_hosts: Vec<String>,

    /// Dynamic cache entries older than this are swept.
    pub retention_secs: u64,

    /// Capability list reported by `GET_VERSION`.
    pub features: Vec<String>,

    /// Time zone announced in `NETWORK_AVAILABLE`.
    pub time_zone: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            app_name: "world-clock".to_string(),
            version: "1.0.0".to_string(),
            origin: Url::parse("http://localhost:8080/").expect("static origin is valid"),
            manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/styles.css".to_string(),
                "/logo.svg".to_string(),
                FONT_STYLESHEET_URL.to_string(),
            ],
            offline_path: "/offline".to_string(),
            font_hosts: vec![
                "fonts.googleapis.com".to_string(),
                "fonts.gstatic.com".to_string(),
            ],
            retention_secs: 24 * 60 * 60,
            features: [
                "offline-support",
                "background-sync",
                "periodic-sync",
                "push-notifications",
                "cache-management",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            time_zone: local_time_zone(),
        }
    }
}

impl WorkerConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> SwResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub async fn load(path: impl AsRef<Path>) -> SwResult<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SwError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Check the invariants the worker relies on.
    pub fn validate(&self) -> SwResult<()> {
        if self.app_name.trim().is_empty() {
            return Err(SwError::Config("app_name must not be empty".into()));
        }
        if self.version.trim().is_empty() {
            return Err(SwError::Config("version must not be empty".into()));
        }
        if self.retention_secs == 0 {
            return Err(SwError::Config("retention_secs must be positive".into()));
        }
        if !self.offline_path.starts_with('/') {
            return Err(SwError::Config(format!(
                "offline_path must be absolute: {}",
                self.offline_path
            )));
        }
        self.manifest_urls()?;
        Ok(())
    }

    /// Cache names for this version.
    pub fn cache_names(&self) -> CacheNames {
        CacheNames {
            static_cache: format!("{}-static-v{}", self.app_name, self.version),
            dynamic_cache: format!("{}-dynamic-v{}", self.app_name, self.version),
        }
    }

    /// Retention window as a `Duration`.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Resolve a possibly relative URL against the origin.
    pub fn resolve(&self, url: &str) -> SwResult<Url> {
        Ok(self.origin.join(url)?)
    }

    /// Absolute URLs of the install manifest.
    pub fn manifest_urls(&self) -> SwResult<Vec<Url>> {
        self.manifest.iter().map(|u| self.resolve(u)).collect()
    }

    /// Absolute URL of the offline page.
    pub fn offline_url(&self) -> SwResult<Url> {
        self.resolve(&self.offline_path)
    }
}

/// Versioned cache names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    pub static_cache: String,
    pub dynamic_cache: String,
}

impl CacheNames {
    /// Whether `name` belongs to the current generation.
    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_cache || name == self.dynamic_cache
    }
}

/// Time zone of the host, from `TZ`, falling back to UTC.
fn local_time_zone() -> String {
    std::env::var("TZ")
        .ok()
        .map(|tz| tz.trim_start_matches(':').to_string())
        .filter(|tz| !tz.is_empty())
        .unwrap_or_else(|| "UTC".to_string())
}
