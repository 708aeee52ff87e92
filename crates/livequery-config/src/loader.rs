// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./livequery.toml` > `~/.config/livequery/livequery.toml`
//! > `/etc/livequery/livequery.toml`, with environment variable overrides via
//! the `LIVEQUERY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::LiveQueryConfig;

const SYSTEM_CONFIG: &str = "/etc/livequery/livequery.toml";
const LOCAL_CONFIG: &str = "livequery.toml";

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/livequery/livequery.toml`
/// 3. `~/.config/livequery/livequery.toml`
/// 4. `./livequery.toml`
/// 5. `LIVEQUERY_*` environment variables
pub fn load_config() -> Result<LiveQueryConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<LiveQueryConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LiveQueryConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LiveQueryConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LiveQueryConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(LiveQueryConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

pub(crate) fn user_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("livequery").join(LOCAL_CONFIG))
}

pub(crate) fn candidate_paths() -> Vec<std::path::PathBuf> {
    let mut paths = vec![std::path::PathBuf::from(SYSTEM_CONFIG)];
    paths.extend(user_config_path());
    paths.push(std::path::PathBuf::from(LOCAL_CONFIG));
    paths
}

/// Environment provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `LIVEQUERY_CAMPAIGN_SUBSCRIBER_BUFFER` must become
/// `campaign.subscriber_buffer`, not `campaign.subscriber.buffer`.
fn env_provider() -> Env {
    Env::prefixed("LIVEQUERY_").map(|key| {
        let mapped = key
            .as_str()
            .replacen("campaign_", "campaign.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("gateway_", "gateway.", 1);
        mapped.into()
    })
}
