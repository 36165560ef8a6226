// src/config/app.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{env, fs, path::Path, path::PathBuf};

use crate::enrich::EnrichOptions;
use crate::geocode::nominatim::{DEFAULT_ENDPOINT, DEFAULT_USER_AGENT};

pub const DEFAULT_CONFIG_PATH: &str = "config/incidents.toml";
pub const DEFAULT_FEED_URL: &str = "https://emergency.uw.edu/feed/";
pub const DEFAULT_STORE_PATH: &str = "data/incidents.csv";

pub const ENV_CONFIG_PATH: &str = "INCIDENTS_CONFIG_PATH";
pub const ENV_FEED_URL: &str = "INCIDENTS_FEED_URL";
pub const ENV_STORE_PATH: &str = "INCIDENTS_STORE_PATH";
pub const ENV_GEOCODER_ENDPOINT: &str = "GEOCODER_ENDPOINT";

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}
fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}
fn default_geocoder_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_fetch_timeout_secs() -> u64 {
    15
}
fn default_geocode_timeout_secs() -> u64 {
    10
}
fn default_geocode_min_interval_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_geocoder_endpoint")]
    pub geocoder_endpoint: String,
    /// Sent on feed and geocoder requests; Nominatim rejects anonymous agents.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_geocode_timeout_secs")]
    pub geocode_timeout_secs: u64,
    #[serde(default = "default_geocode_min_interval_ms")]
    pub geocode_min_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feed_url: default_feed_url(),
            store_path: default_store_path(),
            geocoder_endpoint: default_geocoder_endpoint(),
            user_agent: default_user_agent(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            geocode_timeout_secs: default_geocode_timeout_secs(),
            geocode_min_interval_ms: default_geocode_min_interval_ms(),
        }
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: AppConfig =
            toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
        cfg.validated()
    }

    /// Resolution order:
    /// 1) $INCIDENTS_CONFIG_PATH (must exist)
    /// 2) config/incidents.toml
    /// 3) built-in defaults
    ///
    /// Individual env overrides are applied on top.
    pub fn load_default() -> Result<Self> {
        let cfg = if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from_file(&default_p)?
            } else {
                Self::default()
            }
        };
        cfg.with_env_overrides().validated()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(v) = non_empty_env(ENV_FEED_URL) {
            self.feed_url = v;
        }
        if let Some(v) = non_empty_env(ENV_STORE_PATH) {
            self.store_path = PathBuf::from(v);
        }
        if let Some(v) = non_empty_env(ENV_GEOCODER_ENDPOINT) {
            self.geocoder_endpoint = v;
        }
        self
    }

    fn validated(mut self) -> Result<Self> {
        if self.feed_url.trim().is_empty() {
            anyhow::bail!("feed_url must not be empty");
        }
        if self.store_path.as_os_str().is_empty() {
            anyhow::bail!("store_path must not be empty");
        }
        if self.user_agent.trim().is_empty() {
            self.user_agent = default_user_agent();
        }
        // A zero timeout would fail every call.
        self.fetch_timeout_secs = self.fetch_timeout_secs.max(1);
        self.geocode_timeout_secs = self.geocode_timeout_secs.max(1);
        Ok(self)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn enrich_options(&self) -> EnrichOptions {
        EnrichOptions {
            timeout: Duration::from_secs(self.geocode_timeout_secs),
            min_interval: Duration::from_millis(self.geocode_min_interval_ms),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
