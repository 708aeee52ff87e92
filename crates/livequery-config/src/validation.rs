// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::LiveQueryConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &LiveQueryConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let campaign = &config.campaign;

    if campaign.subscriber_buffer == 0 {
        errors.push(ConfigError::Validation {
            message: "campaign.subscriber_buffer must be at least 1".to_string(),
        });
    }

    for (key, value) in [
        ("online_threshold_secs", campaign.online_threshold_secs),
        ("heartbeat_interval_secs", campaign.heartbeat_interval_secs),
        ("heartbeat_timeout_secs", campaign.heartbeat_timeout_secs),
        ("status_interval_secs", campaign.status_interval_secs),
        ("expiration_horizon_secs", campaign.expiration_horizon_secs),
        ("sweep_interval_secs", campaign.sweep_interval_secs),
    ] {
        if value == 0 {
            errors.push(ConfigError::Validation {
                message: format!("campaign.{key} must be greater than zero"),
            });
        }
    }

    if campaign.heartbeat_timeout_secs >= campaign.heartbeat_interval_secs
        && campaign.heartbeat_interval_secs > 0
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "campaign.heartbeat_timeout_secs ({}) must be less than heartbeat_interval_secs ({})",
                campaign.heartbeat_timeout_secs, campaign.heartbeat_interval_secs
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::Validation {
            message: "gateway.host must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!("gateway.host `{host}` is not a valid IP address or hostname"),
            });
        }
    }

    for (token, viewer) in &config.gateway.bearer_tokens {
        if token.trim().is_empty() || viewer.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: "gateway.bearer_tokens entries must have a non-empty token and viewer"
                    .to_string(),
            });
            break;
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
