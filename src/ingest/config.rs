// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::backoff::BackoffPolicy;
use crate::ingest::fetcher::{DEFAULT_FETCH_TIMEOUT, DEFAULT_USER_AGENT};
use crate::ingest::types::ProviderConfig;

pub const ENV_CONFIG_PATH: &str = "STATUS_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/providers.toml";
pub const DEFAULT_JSON_PATH: &str = "config/providers.json";

pub const DEFAULT_FEED_URL: &str = "https://status.openai.com/history.atom";
pub const DEFAULT_FEED_LABEL: &str = "OpenAI";

fn default_poll_interval_secs() -> u64 {
    60
}
fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_secs()
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_history_capacity() -> usize {
    200
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Used by providers that do not set `poll_interval_secs`.
    #[serde(default = "default_poll_interval_secs")]
    pub default_poll_interval_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// How many recent events `/events` keeps.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub backoff: BackoffPolicy,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            default_poll_interval_secs: default_poll_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
            history_capacity: default_history_capacity(),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub providers: Vec<ProviderConfig>,
    pub settings: MonitorSettings,
}

impl MonitorConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.fetch_timeout_secs.max(1))
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let settings = MonitorSettings::default();
        Self {
            providers: vec![ProviderConfig::new(
                DEFAULT_FEED_URL,
                Duration::from_secs(settings.default_poll_interval_secs),
            )
            .with_label(DEFAULT_FEED_LABEL)],
            settings,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    url: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    poll_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    providers: Vec<RawProvider>,
    #[serde(default)]
    settings: MonitorSettings,
}

/// Load providers from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<MonitorConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading provider config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing provider config {}", path.display()))
}

/// Load providers using env var + fallbacks:
/// 1) $STATUS_CONFIG_PATH
/// 2) config/providers.toml
/// 3) config/providers.json
/// 4) built-in default (OpenAI status feed)
pub fn load_config_default() -> Result<MonitorConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        } else {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from(DEFAULT_JSON_PATH);
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    Ok(MonitorConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<MonitorConfig> {
    let raw = match hint_ext {
        "toml" => parse_toml(s)?,
        "json" => parse_json(s)?,
        _ => parse_json(s).or_else(|_| parse_toml(s))?,
    };
    Ok(build(raw))
}

fn parse_toml(s: &str) -> Result<RawConfig> {
    Ok(toml::from_str(s)?)
}

fn parse_json(s: &str) -> Result<RawConfig> {
    Ok(serde_json::from_str(s)?)
}

/// Trim URLs/labels and drop blank entries. Anything else (bad URL, zero
/// interval, duplicates) is left for the monitor to reject per provider.
fn build(raw: RawConfig) -> MonitorConfig {
    let settings = raw.settings;
    let providers = raw
        .providers
        .into_iter()
        .filter_map(|p| {
            let url = p.url.trim();
            if url.is_empty() {
                return None;
            }
            let secs = p
                .poll_interval_secs
                .unwrap_or(settings.default_poll_interval_secs);
            let mut cfg = ProviderConfig::new(url, Duration::from_secs(secs));
            if let Some(label) = p.label.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
                cfg = cfg.with_label(label);
            }
            Some(cfg)
        })
        .collect();
    MonitorConfig {
        providers,
        settings,
    }
}
