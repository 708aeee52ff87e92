// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable campaign records.

use async_trait::async_trait;

use crate::error::LiveQueryError;
use crate::types::{Campaign, CampaignId};

/// Durability collaborator for campaign records.
///
/// The campaign store keeps active campaigns in memory and writes through
/// this trait on creation and on close.
#[async_trait]
pub trait CampaignPersistence: Send + Sync + 'static {
    /// Inserts or replaces the record for `campaign.id`.
    async fn save_campaign(&self, campaign: &Campaign) -> Result<(), LiveQueryError>;

    async fn load_campaign(&self, id: CampaignId) -> Result<Option<Campaign>, LiveQueryError>;

    /// Highest campaign ID ever saved, used to seed ID allocation.
    async fn last_campaign_id(&self) -> Result<Option<CampaignId>, LiveQueryError>;
}
