// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign lifecycle records.
//!
//! The store is authoritative for active campaigns and owns the only
//! in-memory record of each. Every mutation of one campaign happens under
//! that campaign's own lock, so ingestion for different campaigns never
//! contends. Records reach durable storage at creation and on close.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use livequery_bus::ResultBus;
use livequery_core::{
    Campaign, CampaignId, CampaignPersistence, CampaignStatus, CloseReason, HostId, HostTarget,
    LiveQueryError, Metrics, QueryId, StatusReport, Viewer,
};

use crate::recording;

/// What happened to a host's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// First response from this host; metrics after the increment.
    Accepted(Metrics),
    /// The host already responded to this campaign.
    Duplicate,
    /// The host is not part of the campaign's resolved target.
    NotTargeted,
}

struct ActiveState {
    campaign: Campaign,
    responded: HashSet<HostId>,
    last_activity: DateTime<Utc>,
}

struct ActiveCampaign {
    state: Mutex<ActiveState>,
}

impl ActiveCampaign {
    fn lock(&self) -> MutexGuard<'_, ActiveState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Registry of active campaigns backed by a persistence collaborator.
pub struct CampaignStore {
    active: DashMap<CampaignId, Arc<ActiveCampaign>>,
    persistence: Arc<dyn CampaignPersistence>,
    bus: ResultBus,
    next_id: AtomicU64,
}

impl CampaignStore {
    /// Opens the store, continuing ID allocation after the highest
    /// campaign ID already persisted.
    pub async fn open(
        persistence: Arc<dyn CampaignPersistence>,
        bus: ResultBus,
    ) -> Result<Self, LiveQueryError> {
        let last = persistence.last_campaign_id().await?;
        let next = last.map_or(1, |id| id.0 + 1);
        debug!(next_id = next, "campaign store opened");
        Ok(Self {
            active: DashMap::new(),
            persistence,
            bus,
            next_id: AtomicU64::new(next),
        })
    }

    /// Allocates an ID, persists the new campaign, then registers it as
    /// active and opens its bus topic.
    ///
    /// If persisting fails nothing is registered and no topic exists.
    pub async fn create(
        &self,
        query_id: Option<QueryId>,
        query_text: String,
        created_by: &Viewer,
        target: HostTarget,
        metrics: Metrics,
    ) -> Result<Campaign, LiveQueryError> {
        let id = CampaignId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();
        let campaign = Campaign {
            id,
            query_id,
            query_text,
            created_by: created_by.username.clone(),
            created_at: now,
            status: CampaignStatus::Waiting,
            metrics,
            target,
            closed_at: None,
            close_reason: None,
        };

        self.persistence
            .save_campaign(&campaign)
            .await
            .map_err(as_persistence)?;

        self.active.insert(
            id,
            Arc::new(ActiveCampaign {
                state: Mutex::new(ActiveState {
                    campaign: campaign.clone(),
                    responded: HashSet::new(),
                    last_activity: now,
                }),
            }),
        );
        self.bus.open_topic(id);
        recording::record_campaign_created();
        info!(campaign_id = %id, total_hosts = metrics.total_hosts, "campaign created");
        Ok(campaign)
    }

    fn entry(&self, id: CampaignId) -> Option<Arc<ActiveCampaign>> {
        self.active.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    fn active_entry(&self, id: CampaignId) -> Result<Arc<ActiveCampaign>, LiveQueryError> {
        self.entry(id).ok_or(LiveQueryError::CampaignClosed(id))
    }

    /// Applies `mutate` to the campaign's metrics under its lock and returns
    /// the result.
    pub fn update_metrics<F>(&self, id: CampaignId, mutate: F) -> Result<Metrics, LiveQueryError>
    where
        F: FnOnce(&mut Metrics),
    {
        let entry = self.active_entry(id)?;
        let mut state = entry.lock();
        if state.campaign.status.is_terminal() {
            return Err(LiveQueryError::CampaignClosed(id));
        }
        mutate(&mut state.campaign.metrics);
        state.last_activity = Utc::now();
        Ok(state.campaign.metrics)
    }

    /// Records that `host` responded, counting it active on its first
    /// response only.
    pub fn record_response(
        &self,
        id: CampaignId,
        host: HostId,
    ) -> Result<ResponseOutcome, LiveQueryError> {
        let entry = self.active_entry(id)?;
        let mut state = entry.lock();
        if state.campaign.status.is_terminal() {
            return Err(LiveQueryError::CampaignClosed(id));
        }
        if !state.campaign.target.contains(host) {
            return Ok(ResponseOutcome::NotTargeted);
        }
        if !state.responded.insert(host) {
            return Ok(ResponseOutcome::Duplicate);
        }
        let metrics = &mut state.campaign.metrics;
        metrics.active_hosts = metrics.active_hosts.saturating_add(1).min(metrics.total_hosts);
        let metrics = *metrics;
        state.last_activity = Utc::now();
        Ok(ResponseOutcome::Accepted(metrics))
    }

    /// Moves a waiting campaign to running and returns its record.
    pub fn mark_running(&self, id: CampaignId) -> Result<Campaign, LiveQueryError> {
        let entry = self.active_entry(id)?;
        let mut state = entry.lock();
        match state.campaign.status {
            CampaignStatus::Completed => return Err(LiveQueryError::CampaignClosed(id)),
            CampaignStatus::Waiting => {
                state.campaign.status = CampaignStatus::Running;
                debug!(campaign_id = %id, "campaign running");
            }
            CampaignStatus::Running => {}
        }
        state.last_activity = Utc::now();
        Ok(state.campaign.clone())
    }

    /// Restarts the idle clock of an active campaign.
    pub fn touch(&self, id: CampaignId) {
        if let Some(entry) = self.entry(id) {
            entry.lock().last_activity = Utc::now();
        }
    }

    /// The in-memory record of an active campaign.
    pub fn snapshot(&self, id: CampaignId) -> Option<Campaign> {
        self.entry(id).map(|entry| entry.lock().campaign.clone())
    }

    /// Active campaign, else the durable record, else `NotFound`.
    pub async fn get(&self, id: CampaignId) -> Result<Campaign, LiveQueryError> {
        if let Some(campaign) = self.snapshot(id) {
            return Ok(campaign);
        }
        self.persistence
            .load_campaign(id)
            .await
            .map_err(as_persistence)?
            .ok_or_else(|| LiveQueryError::campaign_not_found(id))
    }

    /// Terminates a campaign: marks it completed, flushes it to durable
    /// storage, drops the active record and tears down its bus topic.
    ///
    /// Closing an already closed campaign returns its record unchanged. If
    /// the flush fails the campaign is still terminated and the error is
    /// returned.
    pub async fn close(
        &self,
        id: CampaignId,
        reason: CloseReason,
    ) -> Result<Campaign, LiveQueryError> {
        let campaign = match self.entry(id) {
            Some(entry) => {
                let mut state = entry.lock();
                if state.campaign.status.is_terminal() {
                    return Ok(state.campaign.clone());
                }
                mark_closed(&mut state.campaign, reason);
                state.campaign.clone()
            }
            None => {
                let mut stored = self
                    .persistence
                    .load_campaign(id)
                    .await
                    .map_err(as_persistence)?
                    .ok_or_else(|| LiveQueryError::campaign_not_found(id))?;
                if stored.status.is_terminal() {
                    return Ok(stored);
                }
                mark_closed(&mut stored, reason);
                stored
            }
        };

        let flushed = self.persistence.save_campaign(&campaign).await;
        self.active.remove(&id);
        let subscribers = self.bus.close_topic(id, reason).unwrap_or(0);
        recording::record_campaign_closed(reason);
        info!(campaign_id = %id, %reason, subscribers, "campaign closed");

        match flushed {
            Ok(()) => Ok(campaign),
            Err(e) => {
                warn!(campaign_id = %id, error = %e, "failed to flush closed campaign");
                Err(as_persistence(e))
            }
        }
    }

    /// Closes every campaign without subscribers whose last activity is at
    /// least `horizon` before `now`. Returns the IDs closed.
    pub async fn expire_idle(
        &self,
        horizon: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Vec<CampaignId> {
        let candidates: Vec<CampaignId> = self
            .active
            .iter()
            .filter(|entry| {
                let idle = now.signed_duration_since(entry.value().lock().last_activity);
                idle >= horizon && self.bus.subscriber_count(*entry.key()) == 0
            })
            .map(|entry| *entry.key())
            .collect();

        let mut expired = Vec::with_capacity(candidates.len());
        for id in candidates {
            match self.close(id, CloseReason::Expired).await {
                Ok(_) => expired.push(id),
                Err(LiveQueryError::Persistence { source }) => {
                    warn!(campaign_id = %id, error = %source, "expired campaign not flushed");
                    expired.push(id);
                }
                Err(e) => warn!(campaign_id = %id, error = %e, "failed to expire campaign"),
            }
        }
        expired
    }

    pub fn is_active(&self, id: CampaignId) -> bool {
        self.active.contains_key(&id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

/// Progress summary derived from a campaign record.
pub fn status_report(campaign: &Campaign) -> StatusReport {
    let metrics = campaign.metrics;
    StatusReport {
        expected_results: metrics.total_hosts.saturating_sub(metrics.missing_hosts),
        actual_results: metrics.active_hosts,
        status: campaign.status,
    }
}

fn mark_closed(campaign: &mut Campaign, reason: CloseReason) {
    campaign.status = CampaignStatus::Completed;
    campaign.closed_at = Some(Utc::now());
    campaign.close_reason = Some(reason);
}

fn as_persistence(err: LiveQueryError) -> LiveQueryError {
    match err {
        LiveQueryError::Persistence { .. } => err,
        other => LiveQueryError::persistence(other),
    }
}
