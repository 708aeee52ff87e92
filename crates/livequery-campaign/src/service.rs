// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The public campaign operations.

use async_trait::async_trait;

use livequery_core::{
    Campaign, CampaignId, HostId, HostTargets, LiveQueryError, QueryRef, Row, Viewer,
    ViewerConnection,
};

use crate::session::SessionReport;

/// What happened to an ingested host result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First result from the host; handed to every current subscriber.
    Published { delivered: usize, dropped: usize },
    /// The host already responded; the result was discarded.
    Duplicate,
    /// The host is not in the campaign's target set.
    NotTargeted,
    /// The campaign is closed or unknown.
    CampaignInactive,
}

impl IngestOutcome {
    /// Short label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestOutcome::Published { .. } => "published",
            IngestOutcome::Duplicate => "duplicate",
            IngestOutcome::NotTargeted => "not_targeted",
            IngestOutcome::CampaignInactive => "campaign_inactive",
        }
    }
}

/// Entry point for creating, feeding, watching and closing campaigns.
///
/// The acting viewer is always passed explicitly.
#[async_trait]
pub trait CampaignService: Send + Sync + 'static {
    /// Authorizes, resolves the query and the targets, and persists a new
    /// campaign.
    async fn create_campaign(
        &self,
        viewer: &Viewer,
        query: QueryRef,
        targets: HostTargets,
    ) -> Result<Campaign, LiveQueryError>;

    /// Like [`CampaignService::create_campaign`], addressing hosts and labels
    /// by name.
    async fn create_campaign_by_names(
        &self,
        viewer: &Viewer,
        query: QueryRef,
        host_names: Vec<String>,
        label_names: Vec<String>,
    ) -> Result<Campaign, LiveQueryError>;

    /// Accepts one host's result. Never waits on viewers.
    async fn ingest_result(
        &self,
        campaign_id: CampaignId,
        host_id: HostId,
        rows: Vec<Row>,
        exec_err: Option<String>,
    ) -> Result<IngestOutcome, LiveQueryError>;

    /// Streams results to `conn` until the session closes.
    async fn stream_results(
        &self,
        viewer: &Viewer,
        campaign_id: CampaignId,
        conn: Box<dyn ViewerConnection>,
    ) -> Result<SessionReport, LiveQueryError>;

    async fn get_campaign(
        &self,
        viewer: &Viewer,
        campaign_id: CampaignId,
    ) -> Result<Campaign, LiveQueryError>;

    /// Closes a campaign, ending every session streaming it.
    async fn close_campaign(
        &self,
        viewer: &Viewer,
        campaign_id: CampaignId,
    ) -> Result<Campaign, LiveQueryError>;
}
