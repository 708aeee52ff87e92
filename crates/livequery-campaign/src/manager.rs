// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The campaign manager: composes resolver, store, bus and sessions behind
//! [`CampaignService`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use livequery_bus::ResultBus;
use livequery_config::CampaignConfig;
use livequery_core::{
    Action, Authorizer, Campaign, CampaignId, CampaignPersistence, CloseReason, HostDatastore,
    HostId, HostResult, HostTargets, LiveQueryError, QueryCatalog, QueryId, QueryRef, Resource,
    ResultOutcome, Row, Viewer, ViewerConnection,
};

use crate::recording;
use crate::resolver::TargetResolver;
use crate::service::{CampaignService, IngestOutcome};
use crate::session::{SessionReport, SessionSettings, StreamingSession};
use crate::store::{CampaignStore, ResponseOutcome};
use crate::sweep;

/// External collaborators the manager is built from.
pub struct Collaborators {
    pub datastore: Arc<dyn HostDatastore>,
    pub queries: Arc<dyn QueryCatalog>,
    pub persistence: Arc<dyn CampaignPersistence>,
    pub authorizer: Arc<dyn Authorizer>,
}

/// Default [`CampaignService`] implementation.
pub struct CampaignManager {
    resolver: TargetResolver,
    store: Arc<CampaignStore>,
    bus: ResultBus,
    datastore: Arc<dyn HostDatastore>,
    queries: Arc<dyn QueryCatalog>,
    authorizer: Arc<dyn Authorizer>,
    settings: SessionSettings,
    sweep_interval: Duration,
    expiration_horizon: Duration,
}

impl CampaignManager {
    /// Builds the manager and opens its campaign store.
    ///
    /// Fails with [`LiveQueryError::InvalidArgument`] on a zero subscriber
    /// buffer or a zero session or sweep period.
    pub async fn open(
        config: &CampaignConfig,
        collaborators: Collaborators,
    ) -> Result<Self, LiveQueryError> {
        let settings = SessionSettings::from_config(config);
        settings.validate()?;
        if config.sweep_interval().is_zero() {
            return Err(LiveQueryError::InvalidArgument(
                "sweep_interval must be greater than zero".into(),
            ));
        }
        if config.subscriber_buffer == 0 {
            return Err(LiveQueryError::InvalidArgument(
                "subscriber_buffer must be greater than zero".into(),
            ));
        }
        let bus = ResultBus::new(config.subscriber_buffer);
        let store =
            Arc::new(CampaignStore::open(collaborators.persistence, bus.clone()).await?);
        Ok(Self {
            resolver: TargetResolver::new(
                Arc::clone(&collaborators.datastore),
                config.online_threshold(),
            ),
            store,
            bus,
            datastore: collaborators.datastore,
            queries: collaborators.queries,
            authorizer: collaborators.authorizer,
            settings,
            sweep_interval: config.sweep_interval(),
            expiration_horizon: config.expiration_horizon(),
        })
    }

    pub fn store(&self) -> &Arc<CampaignStore> {
        &self.store
    }

    pub fn bus(&self) -> &ResultBus {
        &self.bus
    }

    /// Starts the background task that expires idle campaigns. It stops
    /// when `cancel` fires.
    pub fn spawn_expiration_sweep(&self, cancel: CancellationToken) -> JoinHandle<()> {
        sweep::spawn_expiration_sweep(
            Arc::clone(&self.store),
            self.sweep_interval,
            self.expiration_horizon,
            cancel,
        )
    }

    /// Picks the query text a campaign runs.
    ///
    /// A saved query must exist; its text fills in for blank supplied text.
    /// Without an ID the supplied text is required.
    async fn resolve_query(
        &self,
        query: QueryRef,
    ) -> Result<(Option<QueryId>, String), LiveQueryError> {
        let blank = query.text.trim().is_empty();
        match query.id {
            Some(id) => {
                let saved = self
                    .queries
                    .lookup_query(id)
                    .await?
                    .ok_or_else(|| LiveQueryError::NotFound {
                        resource: "query",
                        id: id.to_string(),
                    })?;
                let text = if blank { saved.text } else { query.text };
                Ok((Some(id), text))
            }
            None if blank => Err(LiveQueryError::InvalidArgument(
                "a query id or non-empty query text is required".into(),
            )),
            None => Ok((None, query.text)),
        }
    }

    async fn create(
        &self,
        viewer: &Viewer,
        query: QueryRef,
        targets: HostTargets,
    ) -> Result<Campaign, LiveQueryError> {
        self.authorizer
            .authorize(viewer, Resource::Campaigns, Action::Create)
            .await?;
        let (query_id, query_text) = self.resolve_query(query).await?;
        let (target, metrics) = self.resolver.resolve(&targets, Utc::now()).await?;
        self.store
            .create(query_id, query_text, viewer, target, metrics)
            .await
    }
}

#[async_trait]
impl CampaignService for CampaignManager {
    async fn create_campaign(
        &self,
        viewer: &Viewer,
        query: QueryRef,
        targets: HostTargets,
    ) -> Result<Campaign, LiveQueryError> {
        self.create(viewer, query, targets).await
    }

    async fn create_campaign_by_names(
        &self,
        viewer: &Viewer,
        query: QueryRef,
        host_names: Vec<String>,
        label_names: Vec<String>,
    ) -> Result<Campaign, LiveQueryError> {
        let label_ids = if label_names.is_empty() {
            Vec::new()
        } else {
            self.datastore.lookup_label_ids_by_names(&label_names).await?
        };
        if label_ids.len() < label_names.len() {
            debug!(
                requested = label_names.len(),
                matched = label_ids.len(),
                "ignoring unknown label names"
            );
        }
        let targets = HostTargets {
            host_ids: Vec::new(),
            host_names,
            label_ids,
        };
        self.create(viewer, query, targets).await
    }

    async fn ingest_result(
        &self,
        campaign_id: CampaignId,
        host_id: HostId,
        rows: Vec<Row>,
        exec_err: Option<String>,
    ) -> Result<IngestOutcome, LiveQueryError> {
        let outcome = match self.store.record_response(campaign_id, host_id) {
            Ok(ResponseOutcome::Accepted(_)) => {
                let outcome = match exec_err {
                    Some(message) => ResultOutcome::Error(message),
                    None => ResultOutcome::Rows(rows),
                };
                let report = self.bus.publish(
                    campaign_id,
                    HostResult {
                        campaign_id,
                        host_id,
                        outcome,
                        received_at: Utc::now(),
                    },
                );
                recording::record_dropped(report.dropped as u64);
                IngestOutcome::Published {
                    delivered: report.delivered,
                    dropped: report.dropped,
                }
            }
            Ok(ResponseOutcome::Duplicate) => {
                debug!(%campaign_id, %host_id, "duplicate result discarded");
                IngestOutcome::Duplicate
            }
            Ok(ResponseOutcome::NotTargeted) => {
                debug!(%campaign_id, %host_id, "result from non-targeted host discarded");
                IngestOutcome::NotTargeted
            }
            Err(LiveQueryError::CampaignClosed(_)) => IngestOutcome::CampaignInactive,
            Err(e) => return Err(e),
        };
        recording::record_ingest(outcome.as_str());
        Ok(outcome)
    }

    async fn stream_results(
        &self,
        viewer: &Viewer,
        campaign_id: CampaignId,
        conn: Box<dyn ViewerConnection>,
    ) -> Result<SessionReport, LiveQueryError> {
        if let Err(e) = self
            .authorizer
            .authorize(viewer, Resource::Campaign(campaign_id), Action::Read)
            .await
        {
            StreamingSession::reject(campaign_id, conn, e.to_string(), self.settings).await;
            return Err(e);
        }
        let session = StreamingSession::new(
            campaign_id,
            viewer.clone(),
            Arc::clone(&self.store),
            self.bus.clone(),
            self.settings,
            conn,
        );
        Ok(session.run().await)
    }

    async fn get_campaign(
        &self,
        viewer: &Viewer,
        campaign_id: CampaignId,
    ) -> Result<Campaign, LiveQueryError> {
        self.authorizer
            .authorize(viewer, Resource::Campaign(campaign_id), Action::Read)
            .await?;
        self.store.get(campaign_id).await
    }

    async fn close_campaign(
        &self,
        viewer: &Viewer,
        campaign_id: CampaignId,
    ) -> Result<Campaign, LiveQueryError> {
        self.authorizer
            .authorize(viewer, Resource::Campaign(campaign_id), Action::Close)
            .await?;
        self.store.close(campaign_id, CloseReason::Explicit).await
    }
}
