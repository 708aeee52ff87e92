// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured logging around every [`CampaignService`] operation.
//!
//! [`LoggingCampaignService`] wraps any service and emits one event per call
//! with the method, the acting viewer, the query, the host count, the
//! error (if any) and the elapsed time. Failures log at `warn`, successes
//! at `info`; result ingestion logs successes at `debug` because it runs
//! once per host check-in.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use livequery_core::{
    Campaign, CampaignId, HostId, HostTargets, LiveQueryError, QueryRef, Row, Viewer,
    ViewerConnection,
};

use crate::recording;
use crate::service::{CampaignService, IngestOutcome};
use crate::session::SessionReport;

/// Logging decorator over a [`CampaignService`].
pub struct LoggingCampaignService<S> {
    inner: S,
}

impl<S: CampaignService> LoggingCampaignService<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

fn log_creation(
    method: &'static str,
    viewer: &Viewer,
    query: &QueryRef,
    result: &Result<Campaign, LiveQueryError>,
    took: Duration,
) {
    recording::record_latency(method, took.as_secs_f64());
    match result {
        Ok(campaign) => info!(
            method,
            user = %viewer,
            sql = %campaign.query_text,
            query_id = ?campaign.query_id,
            campaign_id = %campaign.id,
            num_hosts = campaign.metrics.total_hosts,
            took = ?took,
            "campaign created"
        ),
        Err(err) => warn!(
            method,
            user = %viewer,
            sql = %query.text,
            query_id = ?query.id,
            err = %err,
            took = ?took,
            "campaign creation failed"
        ),
    }
}

fn log_lookup(
    method: &'static str,
    viewer: &Viewer,
    campaign_id: CampaignId,
    result: &Result<Campaign, LiveQueryError>,
    took: Duration,
) {
    recording::record_latency(method, took.as_secs_f64());
    match result {
        Ok(campaign) => info!(
            method,
            user = %viewer,
            %campaign_id,
            sql = %campaign.query_text,
            query_id = ?campaign.query_id,
            num_hosts = campaign.metrics.total_hosts,
            status = %campaign.status,
            took = ?took,
            "campaign operation"
        ),
        Err(err) => warn!(
            method,
            user = %viewer,
            %campaign_id,
            err = %err,
            took = ?took,
            "campaign operation failed"
        ),
    }
}

#[async_trait]
impl<S: CampaignService> CampaignService for LoggingCampaignService<S> {
    async fn create_campaign(
        &self,
        viewer: &Viewer,
        query: QueryRef,
        targets: HostTargets,
    ) -> Result<Campaign, LiveQueryError> {
        let started = Instant::now();
        let logged = query.clone();
        let result = self.inner.create_campaign(viewer, query, targets).await;
        log_creation("create_campaign", viewer, &logged, &result, started.elapsed());
        result
    }

    async fn create_campaign_by_names(
        &self,
        viewer: &Viewer,
        query: QueryRef,
        host_names: Vec<String>,
        label_names: Vec<String>,
    ) -> Result<Campaign, LiveQueryError> {
        let started = Instant::now();
        let logged = query.clone();
        let result = self
            .inner
            .create_campaign_by_names(viewer, query, host_names, label_names)
            .await;
        log_creation(
            "create_campaign_by_names",
            viewer,
            &logged,
            &result,
            started.elapsed(),
        );
        result
    }

    async fn ingest_result(
        &self,
        campaign_id: CampaignId,
        host_id: HostId,
        rows: Vec<Row>,
        exec_err: Option<String>,
    ) -> Result<IngestOutcome, LiveQueryError> {
        let started = Instant::now();
        let failed_on_host = exec_err.is_some();
        let result = self
            .inner
            .ingest_result(campaign_id, host_id, rows, exec_err)
            .await;
        let took = started.elapsed();
        recording::record_latency("ingest_result", took.as_secs_f64());
        match &result {
            Ok(outcome) => debug!(
                method = "ingest_result",
                %campaign_id,
                %host_id,
                outcome = outcome.as_str(),
                failed_on_host,
                took = ?took,
                "result ingested"
            ),
            Err(err) => warn!(
                method = "ingest_result",
                %campaign_id,
                %host_id,
                err = %err,
                took = ?took,
                "result ingestion failed"
            ),
        }
        result
    }

    async fn stream_results(
        &self,
        viewer: &Viewer,
        campaign_id: CampaignId,
        conn: Box<dyn ViewerConnection>,
    ) -> Result<SessionReport, LiveQueryError> {
        let started = Instant::now();
        let result = self.inner.stream_results(viewer, campaign_id, conn).await;
        let took = started.elapsed();
        recording::record_latency("stream_results", took.as_secs_f64());
        match &result {
            Ok(report) => info!(
                method = "stream_results",
                user = %viewer,
                %campaign_id,
                end = %report.end,
                delivered = report.delivered,
                dropped = report.dropped,
                took = ?took,
                "stream closed"
            ),
            Err(err) => warn!(
                method = "stream_results",
                user = %viewer,
                %campaign_id,
                err = %err,
                took = ?took,
                "stream refused"
            ),
        }
        result
    }

    async fn get_campaign(
        &self,
        viewer: &Viewer,
        campaign_id: CampaignId,
    ) -> Result<Campaign, LiveQueryError> {
        let started = Instant::now();
        let result = self.inner.get_campaign(viewer, campaign_id).await;
        log_lookup("get_campaign", viewer, campaign_id, &result, started.elapsed());
        result
    }

    async fn close_campaign(
        &self,
        viewer: &Viewer,
        campaign_id: CampaignId,
    ) -> Result<Campaign, LiveQueryError> {
        let started = Instant::now();
        let result = self.inner.close_campaign(viewer, campaign_id).await;
        log_lookup("close_campaign", viewer, campaign_id, &result, started.elapsed());
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use livequery_config::CampaignConfig;
    use livequery_test_utils::{AllowAll, MemoryDatastore, MemoryPersistence};
    use tracing_test::traced_test;

    use super::*;
    use crate::manager::{CampaignManager, Collaborators};

    async fn service() -> LoggingCampaignService<CampaignManager> {
        let datastore = Arc::new(MemoryDatastore::new().with_host(7, "web-7", Utc::now()));
        let manager = CampaignManager::open(
            &CampaignConfig::default(),
            Collaborators {
                datastore: datastore.clone(),
                queries: datastore,
                persistence: Arc::new(MemoryPersistence::new()),
                authorizer: Arc::new(AllowAll),
            },
        )
        .await
        .unwrap();
        LoggingCampaignService::new(manager)
    }

    fn query(text: &str) -> QueryRef {
        QueryRef {
            id: None,
            text: text.into(),
        }
    }

    fn host_7() -> HostTargets {
        HostTargets {
            host_ids: vec![HostId(7)],
            ..HostTargets::default()
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn successful_creation_logs_fields() {
        let svc = service().await;
        svc.create_campaign(&Viewer::new("alice"), query("SELECT * FROM users"), host_7())
            .await
            .unwrap();
        assert!(logs_contain("campaign created"));
        assert!(logs_contain("method=\"create_campaign\""));
        assert!(logs_contain("user=alice"));
        assert!(logs_contain("sql=SELECT * FROM users"));
        assert!(logs_contain("num_hosts=1"));
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_creation_logs_error() {
        let svc = service().await;
        let err = svc
            .create_campaign(&Viewer::new("bob"), query("SELECT 1"), HostTargets::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LiveQueryError::EmptyTarget));
        assert!(logs_contain("campaign creation failed"));
        assert!(logs_contain("user=bob"));
        assert!(logs_contain("no hosts matched"));
    }

    #[tokio::test]
    #[traced_test]
    async fn close_logs_campaign() {
        let svc = service().await;
        let viewer = Viewer::new("carol");
        let campaign = svc
            .create_campaign(&viewer, query("SELECT 2"), host_7())
            .await
            .unwrap();
        svc.close_campaign(&viewer, campaign.id).await.unwrap();
        assert!(logs_contain("method=\"close_campaign\""));
        assert!(logs_contain("status=completed"));
    }
}
