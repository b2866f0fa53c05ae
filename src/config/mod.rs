use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Complete client configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MutopiaConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Transport defaults. Every value can be overridden per request.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Prefix for relative request targets
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Resends after a network or timeout failure
    #[serde(default)]
    pub retry: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Token refresh endpoint, relative to `base_url`
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_refresh_path() -> String {
    "/api/auth/refresh".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            retry: 0,
            retry_delay_ms: default_retry_delay_ms(),
            refresh_path: default_refresh_path(),
        }
    }
}

impl ApiConfig {
    /// Defaults pointed at `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Where the session tokens live.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// SQLite file. Tokens are kept in memory only when unset.
    #[serde(default)]
    pub path: Option<String>,
    /// Identity the storage key is derived from. Defaults to the API base URL.
    #[serde(default)]
    pub origin: Option<String>,
}

impl MutopiaConfig {
    /// Environment overrides, applied on top of whatever was loaded.
    pub fn apply_env(mut self) -> Self {
        if let Ok(v) = std::env::var("MUTOPIA_API_BASE_URL") {
            self.api.base_url = v;
        }
        if let Ok(v) = std::env::var("MUTOPIA_TIMEOUT_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.api.timeout_ms = n;
            }
        }
        if let Ok(v) = std::env::var("MUTOPIA_RETRY") {
            if let Ok(n) = v.parse::<u32>() {
                self.api.retry = n;
            }
        }
        if let Ok(v) = std::env::var("MUTOPIA_RETRY_DELAY_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.api.retry_delay_ms = n;
            }
        }
        if let Ok(v) = std::env::var("MUTOPIA_ORIGIN") {
            self.storage.origin = Some(v);
        }
        if let Ok(v) = std::env::var("MUTOPIA_STORAGE_PATH") {
            self.storage.path = Some(v);
        }

        self
    }

    /// Key-derivation origin: explicit setting, else the API base URL.
    pub fn origin(&self) -> &str {
        self.storage
            .origin
            .as_deref()
            .unwrap_or(&self.api.base_url)
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<MutopiaConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config {path}"))?;
    let config: MutopiaConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config {path}"))?;
    Ok(config)
}
