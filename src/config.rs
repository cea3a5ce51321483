use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::ConfigError;
use crate::models::Target;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_LOG_FILTER: &str = "sentinel=info,tower_http=info";
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Upper bound for `check_interval_secs` (30 days).
pub const MAX_CHECK_INTERVAL_SECS: u64 = 30 * 24 * 60 * 60;
/// Upper bound for `probe_timeout_secs` (10 minutes).
pub const MAX_PROBE_TIMEOUT_SECS: u64 = 10 * 60;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SupervisorConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default)]
    pub sweep_on_start: bool,
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,
    #[serde(default)]
    pub alert_policy: AlertPolicy,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub targets: Vec<Target>,
}

fn default_service_name() -> String { "Sentinel".into() }
fn default_host() -> String { "0.0.0.0".into() }
fn default_api_port() -> u16 { 10000 }
fn default_check_interval() -> u64 { 30 * 60 }
fn default_probe_timeout() -> u64 { 15 }

/// What a timer tick does when a sweep is already running.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    #[default]
    Queue,
    Skip,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertPolicy {
    #[default]
    EverySweep,
    OnTransition,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TelegramConfig {
    pub token: Option<String>,
    pub chat_id: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String { TELEGRAM_API_BASE.into() }

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            chat_id: None,
            api_base: default_api_base(),
        }
    }
}

impl TelegramConfig {
    /// Token and chat id, when both are present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.token.as_deref(), self.chat_id.as_deref()) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => Some((token, chat)),
            _ => None,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            host: default_host(),
            api_port: default_api_port(),
            check_interval_secs: default_check_interval(),
            probe_timeout_secs: default_probe_timeout(),
            sweep_on_start: false,
            overlap_policy: OverlapPolicy::default(),
            alert_policy: AlertPolicy::default(),
            telegram: TelegramConfig::default(),
            targets: Vec::new(),
        }
    }
}

impl SupervisorConfig {
    /// Reads the JSON file (if present), applies environment overrides and validates.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "config file not found, using defaults and environment");
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_TOKEN") {
            self.telegram.token = Some(token);
        }
        if let Some(chat_id) = lookup("ADMIN_CHAT_ID") {
            self.telegram.chat_id = Some(chat_id);
        }
        if let Some(spec) = lookup("SUPERVISOR_TARGETS") {
            self.targets = parse_targets(&spec)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval("check_interval_secs"));
        }
        if self.probe_timeout_secs == 0 {
            return Err(ConfigError::InvalidInterval("probe_timeout_secs"));
        }
        if self.check_interval_secs > MAX_CHECK_INTERVAL_SECS {
            return Err(ConfigError::IntervalTooLarge("check_interval_secs", MAX_CHECK_INTERVAL_SECS));
        }
        if self.probe_timeout_secs > MAX_PROBE_TIMEOUT_SECS {
            return Err(ConfigError::IntervalTooLarge("probe_timeout_secs", MAX_PROBE_TIMEOUT_SECS));
        }
        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err(ConfigError::EmptyTargetName(target.url.clone()));
            }
            if !seen.insert(target.name.as_str()) {
                return Err(ConfigError::DuplicateTarget(target.name.clone()));
            }
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Parses `name=url,name=url` keeping the given order.
fn parse_targets(spec: &str) -> Result<Vec<Target>, ConfigError> {
    spec.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, url)) if !url.trim().is_empty() => Ok(Target {
                name: name.trim().to_string(),
                url: url.trim().to_string(),
            }),
            _ => Err(ConfigError::InvalidTargetSpec(entry.to_string())),
        })
        .collect()
}
