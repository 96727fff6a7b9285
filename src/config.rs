// =============================================================================
// Runtime Configuration — JSON file with env-var overrides
// =============================================================================
//
// Precedence: built-in defaults < config file < environment. Every field has
// a serde default so a partial config file stays valid across upgrades.
// =============================================================================

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Upstream base URLs, tried in order.
    #[serde(default = "default_upstream_bases")]
    pub upstream_bases: Vec<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_referer")]
    pub referer: String,

    /// Path of the JSON document store.
    #[serde(default = "default_history_path")]
    pub history_path: String,

    /// TTL of the history and indicator caches, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,

    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    /// Postgres connection URL; the relational backend is disabled when unset.
    #[serde(default)]
    pub database_url: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_upstream_bases() -> Vec<String> {
    vec![
        "https://www.nepalstock.com".to_string(),
        "https://nepalstock.com".to_string(),
        "https://www.nepalstock.com.np".to_string(),
        "https://nepalstock.com.np".to_string(),
    ]
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
        .to_string()
}

fn default_referer() -> String {
    "https://www.nepalstock.com/".to_string()
}

fn default_history_path() -> String {
    "data/ohlc_history.json".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    900
}

fn default_rate_limit_max_requests() -> u32 {
    30
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            upstream_bases: default_upstream_bases(),
            user_agent: default_user_agent(),
            referer: default_referer(),
            history_path: default_history_path(),
            cache_ttl_secs: default_cache_ttl_secs(),
            rate_limit_max_requests: default_rate_limit_max_requests(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            database_url: None,
        }
    }
}

impl RuntimeConfig {
    /// Load the config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        debug!(path = %path.display(), "loaded runtime config");
        Ok(config)
    }

    /// Persist the config atomically (temporary sibling + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(self).context("serialising config")?;
        fs::write(&tmp, text).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides on top of the file-loaded values.
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("BIND_ADDR") {
            if !addr.trim().is_empty() {
                self.bind_addr = addr.trim().to_string();
            }
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                self.database_url = Some(url.trim().to_string());
            }
        }
        if let Ok(path) = std::env::var("OHLC_HISTORY_PATH") {
            if !path.trim().is_empty() {
                self.history_path = path.trim().to_string();
            }
        }
        if let Ok(raw) = std::env::var("CACHE_TTL_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(ttl) => self.cache_ttl_secs = ttl,
                Err(_) => warn!(raw = %raw, "ignoring invalid CACHE_TTL_SECS"),
            }
        }
    }
}
