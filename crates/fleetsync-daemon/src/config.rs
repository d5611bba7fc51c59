//! Configuration loading and validation

use anyhow::{Context, Result};
use fleetsync_engine::{DedupPolicy, SyncOptions, DEFAULT_CONCURRENCY};
use fleetsync_inventory::{NautobotConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub facts: FactsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the status API
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Scheduled sync interval in seconds (0 disables the schedule)
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            interval_secs: default_interval(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8090".to_string()
}

fn default_interval() -> u64 {
    900 // Every 15 minutes
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Base URL of the Nautobot instance
    #[serde(default = "default_url")]
    pub url: String,
    /// API token; prefer `token_env` to keep it out of the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Environment variable holding the API token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Results requested per page when listing
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            token_env: default_token_env(),
            timeout_secs: default_timeout(),
            page_size: default_page_size(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_token_env() -> String {
    "NAUTOBOT_TOKEN".to_string()
}

fn default_timeout() -> u64 {
    15
}

fn default_page_size() -> u32 {
    250
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Devices synced at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Manufacturer recorded on device types
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,
    /// Which duplicate survives dedup (first, lowest-id)
    #[serde(default)]
    pub dedup_policy: DedupPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            manufacturer: default_manufacturer(),
            dedup_policy: DedupPolicy::default(),
        }
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_manufacturer() -> String {
    SyncOptions::default().manufacturer
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per inventory call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

fn default_max_attempts() -> u32 {
    RetryConfig::default().max_attempts
}

fn default_base_delay() -> u64 {
    RetryConfig::default().base_delay_ms
}

fn default_max_delay() -> u64 {
    RetryConfig::default().max_delay_ms
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactsConfig {
    /// Directory of collector JSON documents, one per device
    #[serde(default = "default_facts_path")]
    pub path: String,
}

impl Default for FactsConfig {
    fn default() -> Self {
        Self {
            path: default_facts_path(),
        }
    }
}

fn default_facts_path() -> String {
    "./facts".to_string()
}

impl Config {
    /// Explicit token wins over the environment variable
    pub fn resolve_token(&self) -> Option<String> {
        self.inventory
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(&self.inventory.token_env).ok())
            .filter(|t| !t.is_empty())
    }

    /// Convert to NautobotConfig
    pub fn to_nautobot_config(&self) -> NautobotConfig {
        let token = self.resolve_token().unwrap_or_else(|| {
            warn!(
                env = %self.inventory.token_env,
                "No inventory token configured, requests will be unauthenticated"
            );
            String::new()
        });
        NautobotConfig {
            url: self.inventory.url.clone(),
            token,
            timeout: Duration::from_secs(self.inventory.timeout_secs),
            page_size: self.inventory.page_size,
        }
    }

    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn to_sync_options(&self, dry_run: bool) -> SyncOptions {
        SyncOptions {
            manufacturer: self.sync.manufacturer.clone(),
            dry_run,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
