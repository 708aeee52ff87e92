// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory campaign persistence with injectable write failures.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use livequery_core::{Campaign, CampaignId, CampaignPersistence, LiveQueryError};

/// Campaign records held in memory.
#[derive(Default)]
pub struct MemoryPersistence {
    campaigns: Mutex<BTreeMap<CampaignId, Campaign>>,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every `save_campaign` fails and nothing is stored.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The stored record for `id`, if any.
    pub async fn stored(&self, id: CampaignId) -> Option<Campaign> {
        self.campaigns.lock().await.get(&id).cloned()
    }

    pub async fn stored_count(&self) -> usize {
        self.campaigns.lock().await.len()
    }
}

#[async_trait]
impl CampaignPersistence for MemoryPersistence {
    async fn save_campaign(&self, campaign: &Campaign) -> Result<(), LiveQueryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LiveQueryError::persistence(std::io::Error::other(
                "injected write failure",
            )));
        }
        self.campaigns
            .lock()
            .await
            .insert(campaign.id, campaign.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_campaign(&self, id: CampaignId) -> Result<Option<Campaign>, LiveQueryError> {
        Ok(self.campaigns.lock().await.get(&id).cloned())
    }

    async fn last_campaign_id(&self) -> Result<Option<CampaignId>, LiveQueryError> {
        Ok(self.campaigns.lock().await.keys().next_back().copied())
    }
}
