//! Configuration management for caselink.
//!
//! Loads settings from an explicit path, `$CASELINK_CONFIG`,
//! /etc/caselink/config.toml or /var/lib/caselink/config.toml, in that
//! order. Falls back to defaults when none can be read.

use anyhow::{Context, Result};
use caselink_shared::{DEFAULT_ASSET_TABLE, DEFAULT_CASE_TABLE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/caselink/config.toml";

/// Default config file path for fallback
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/caselink/config.toml";

/// Environment override for the config path
pub const CONFIG_ENV: &str = "CASELINK_CONFIG";

/// Ticketing REST settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketingConfig {
    /// Table cases are created in
    #[serde(default = "default_case_table")]
    pub case_table: String,

    /// Table digital assets are looked up in
    #[serde(default = "default_asset_table")]
    pub asset_table: String,

    /// Per-request timeout for REST and token calls
    #[serde(default = "default_ticketing_timeout")]
    pub timeout_secs: u64,

    /// Written to the case `u_source` field
    #[serde(default = "default_source_label")]
    pub source_label: String,
}

fn default_case_table() -> String {
    DEFAULT_CASE_TABLE.to_string()
}

fn default_asset_table() -> String {
    DEFAULT_ASSET_TABLE.to_string()
}

fn default_ticketing_timeout() -> u64 {
    30
}

fn default_source_label() -> String {
    "caselink".to_string()
}

impl Default for TicketingConfig {
    fn default() -> Self {
        Self {
            case_table: default_case_table(),
            asset_table: default_asset_table(),
            timeout_secs: default_ticketing_timeout(),
            source_label: default_source_label(),
        }
    }
}

/// Where account stanzas and secrets live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_credentials_path")]
    pub path: PathBuf,
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("/etc/caselink/credentials.toml")
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: default_credentials_path(),
        }
    }
}

/// Mapping ledger location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("/var/lib/caselink/ledger.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ledger_path: default_ledger_path(),
        }
    }
}

/// Raw event export and the search UI that links back to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// JSON-lines export of observability records
    #[serde(default = "default_events_path")]
    pub path: PathBuf,

    /// Records older than this are ignored when building a context
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Search page the case description links to
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// Index named in the event search link
    #[serde(default = "default_index")]
    pub index: String,
}

fn default_events_path() -> PathBuf {
    PathBuf::from("/var/lib/caselink/events.jsonl")
}

fn default_lookback_days() -> u32 {
    7
}

fn default_search_url() -> String {
    "http://localhost:8000/en-US/app/search/search".to_string()
}

fn default_index() -> String {
    "gen_ai_log".to_string()
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            path: default_events_path(),
            lookback_days: default_lookback_days(),
            search_url: default_search_url(),
            index: default_index(),
        }
    }
}

/// AI summary backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Off means the structured fallback is always used
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_summary_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_summary_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_summary_timeout")]
    pub timeout_secs: u64,
}

fn default_summary_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_summary_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_summary_timeout() -> u64 {
    120
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_summary_endpoint(),
            model: default_summary_model(),
            api_key: None,
            timeout_secs: default_summary_timeout(),
        }
    }
}

/// Full caselink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ticketing: TicketingConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub summary: SummaryConfig,
}

impl Config {
    /// Load config for this invocation.
    ///
    /// An explicit path must be readable. The implicit locations fall back
    /// to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load_from_path(Path::new(&path))
                .with_context(|| format!("Failed to load config from ${} ({})", CONFIG_ENV, path));
        }

        Ok(Self::load_from_path(Path::new(CONFIG_PATH))
            .or_else(|_| Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH)))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                Config::default()
            }))
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
