// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for livequery.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level livequery configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LiveQueryConfig {
    /// Logging level (trace, debug, info, warn, error) or a full filter directive.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Campaign engine tuning.
    #[serde(default)]
    pub campaign: CampaignConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP/WebSocket gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Default for LiveQueryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            campaign: CampaignConfig::default(),
            storage: StorageConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Campaign engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CampaignConfig {
    /// A host is online if it checked in within this many seconds.
    #[serde(default = "default_online_threshold_secs")]
    pub online_threshold_secs: u64,

    /// Bounded queue length per subscriber. Results beyond it are dropped.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Interval between heartbeats sent to each viewer.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// A heartbeat that cannot be written within this time ends the session.
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,

    /// Interval between totals/status updates sent to each viewer.
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,

    /// Campaigns idle (no results, no viewers) for this long are expired.
    #[serde(default = "default_expiration_horizon_secs")]
    pub expiration_horizon_secs: u64,

    /// How often the expiration sweep runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Upper bound on flushing buffered results when a session closes.
    #[serde(default = "default_flush_timeout_millis")]
    pub flush_timeout_millis: u64,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            online_threshold_secs: default_online_threshold_secs(),
            subscriber_buffer: default_subscriber_buffer(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            status_interval_secs: default_status_interval_secs(),
            expiration_horizon_secs: default_expiration_horizon_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            flush_timeout_millis: default_flush_timeout_millis(),
        }
    }
}

impl CampaignConfig {
    pub fn online_threshold(&self) -> Duration {
        Duration::from_secs(self.online_threshold_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    pub fn expiration_horizon(&self) -> Duration {
        Duration::from_secs(self.expiration_horizon_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_millis)
    }
}

fn default_online_threshold_secs() -> u64 {
    30 * 60
}

fn default_subscriber_buffer() -> usize {
    256
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_heartbeat_timeout_secs() -> u64 {
    10
}

fn default_status_interval_secs() -> u64 {
    5
}

fn default_expiration_horizon_secs() -> u64 {
    60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_flush_timeout_millis() -> u64 {
    500
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("livequery").join("livequery.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("livequery.db"))
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// HTTP/WebSocket gateway configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token to viewer username. Empty rejects every request.
    #[serde(default)]
    pub bearer_tokens: BTreeMap<String, String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_tokens: BTreeMap::new(),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bearer_tokens", &format!("[{} redacted]", self.bearer_tokens.len()))
            .finish()
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8085
}
