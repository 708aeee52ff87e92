// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy shared by every livequery crate.

use thiserror::Error;

use crate::types::CampaignId;

/// The primary error type returned by campaign operations and collaborators.
#[derive(Debug, Error)]
pub enum LiveQueryError {
    /// Malformed or missing required input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The target spec resolved to no hosts at all.
    #[error("no hosts matched the campaign targets")]
    EmptyTarget,

    /// Unknown campaign, host, label, or query.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// The caller lacks permission for the requested action.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// The operation targeted a campaign that has already terminated.
    #[error("campaign {0} is closed")]
    CampaignClosed(CampaignId),

    /// The durability collaborator rejected a read or write.
    #[error("persistence error: {source}")]
    Persistence {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A viewer connection failed. Only ever terminates the owning session.
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration errors (invalid TOML, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LiveQueryError {
    /// Shorthand for a [`LiveQueryError::NotFound`] on a campaign.
    pub fn campaign_not_found(id: CampaignId) -> Self {
        LiveQueryError::NotFound {
            resource: "campaign",
            id: id.to_string(),
        }
    }

    /// Wraps any error as a [`LiveQueryError::Persistence`].
    pub fn persistence(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        LiveQueryError::Persistence {
            source: source.into(),
        }
    }
}
