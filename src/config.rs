//! TOML configuration.
//!
//! ```toml
//! [backend]
//! base_url = "http://localhost:8000"
//! request_timeout_secs = 30
//! connect_timeout_secs = 5
//!
//! [monitor]
//! health_interval_secs = 10
//! setup_interval_secs = 5
//!
//! [chat]
//! default_model = "llama3.2:3b"
//!
//! [storage]
//! state_path = "./data/mnemora-state.json"
//! ```
//!
//! Every section is optional; missing values fall back to the defaults
//! above. Streaming endpoints are not subject to `request_timeout_secs`,
//! only to `connect_timeout_secs`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout for single-response endpoints (`/health`, `/models`, ...).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,
    #[serde(default = "default_setup_interval")]
    pub setup_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            health_interval_secs: default_health_interval(),
            setup_interval_secs: default_setup_interval(),
        }
    }
}

impl MonitorConfig {
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn setup_interval(&self) -> Duration {
        Duration::from_secs(self.setup_interval_secs)
    }
}

fn default_health_interval() -> u64 {
    10
}
fn default_setup_interval() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:3b".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("./data/mnemora-state.json")
}

impl Config {
    /// All defaults. Used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

fn validate(config: &Config) -> Result<()> {
    let url = config.backend.base_url.trim();
    if url.is_empty() {
        anyhow::bail!("backend.base_url must not be empty");
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        anyhow::bail!(
            "backend.base_url must start with http:// or https:// (got '{}')",
            url
        );
    }
    reqwest::Url::parse(url)
        .with_context(|| format!("backend.base_url is not a valid URL: {}", url))?;

    if config.backend.request_timeout_secs == 0 {
        anyhow::bail!("backend.request_timeout_secs must be > 0");
    }
    if config.backend.connect_timeout_secs == 0 {
        anyhow::bail!("backend.connect_timeout_secs must be > 0");
    }

    if config.monitor.health_interval_secs == 0 {
        anyhow::bail!("monitor.health_interval_secs must be > 0");
    }
    if config.monitor.setup_interval_secs == 0 {
        anyhow::bail!("monitor.setup_interval_secs must be > 0");
    }

    if config.chat.default_model.trim().is_empty() {
        anyhow::bail!("chat.default_model must not be empty");
    }

    Ok(())
}
