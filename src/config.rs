// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::providers::{app_store, google_play};
use crate::notify::telegram;

pub const ENV_CONFIG_PATH: &str = "RELAY_CONFIG_PATH";
pub const ENV_TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
pub const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 600;
const DEFAULT_MAX_PAGES: usize = 2;
const DEFAULT_OUTBOX_CAPACITY: usize = 5;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: telegram::DEFAULT_API_BASE.to_string(),
            bot_token: None,
        }
    }
}

/// Runtime settings for the relay. Every field has a default, so an empty
/// file (or no file at all) is a valid configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    pub poll_interval_secs: u64,
    pub max_pages: usize,
    pub outbox_capacity: usize,
    pub store_path: PathBuf,
    pub ops_addr: String,
    pub app_store_base: String,
    pub google_play_base: String,
    pub http_timeout_secs: u64,
    pub telegram: TelegramConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_pages: DEFAULT_MAX_PAGES,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            store_path: PathBuf::from("state/targets.json"),
            ops_addr: "0.0.0.0:8080".to_string(),
            app_store_base: app_store::DEFAULT_BASE.to_string(),
            google_play_base: google_play::DEFAULT_BASE.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            telegram: TelegramConfig::default(),
        }
    }
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Replace zero values with defaults.
    fn sanitized(mut self) -> Self {
        if self.poll_interval_secs == 0 {
            self.poll_interval_secs = DEFAULT_POLL_INTERVAL_SECS;
        }
        if self.max_pages == 0 {
            self.max_pages = DEFAULT_MAX_PAGES;
        }
        if self.outbox_capacity == 0 {
            self.outbox_capacity = DEFAULT_OUTBOX_CAPACITY;
        }
        if self.http_timeout_secs == 0 {
            self.http_timeout_secs = DEFAULT_HTTP_TIMEOUT_SECS;
        }
        self.telegram.bot_token = self
            .telegram
            .bot_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var(ENV_TELEGRAM_TOKEN) {
            let token = token.trim();
            if !token.is_empty() {
                self.telegram.bot_token = Some(token.to_string());
            }
        }
        self
    }
}

/// Parse a TOML document into a sanitized config.
pub fn parse_config(s: &str) -> Result<RelayConfig> {
    let cfg: RelayConfig = toml::from_str(s).context("parsing relay config")?;
    Ok(cfg.sanitized())
}

/// Load config from an explicit path.
pub fn load_config_from(path: &Path) -> Result<RelayConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading relay config from {}", path.display()))?;
    parse_config(&content)
}

/// Load config using env var + fallbacks:
/// 1) $RELAY_CONFIG_PATH
/// 2) config/relay.toml
/// 3) built-in defaults
///
/// `TELEGRAM_TOKEN` overrides the bot token in every case.
pub fn load_config_default() -> Result<RelayConfig> {
    let cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        load_config_from(&pb)?
    } else {
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            load_config_from(&default_p)?
        } else {
            RelayConfig::default()
        }
    };
    Ok(cfg.with_env_overrides())
}
