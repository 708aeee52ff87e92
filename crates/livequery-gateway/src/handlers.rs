// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the campaign REST API.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use livequery_campaign::IngestOutcome;
use livequery_core::{
    Campaign, CampaignId, HostId, HostTargets, LiveQueryError, QueryId, QueryRef, Row, Viewer,
};

use crate::server::GatewayState;

/// Request body for POST /v1/campaigns.
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    /// Query text. May be empty when `query_id` names a saved query.
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub query_id: Option<QueryId>,
    #[serde(default)]
    pub targets: HostTargets,
}

/// Request body for POST /v1/campaigns/by-names.
#[derive(Debug, Deserialize)]
pub struct CreateByNamesRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub query_id: Option<QueryId>,
    #[serde(default)]
    pub host_names: Vec<String>,
    #[serde(default)]
    pub label_names: Vec<String>,
}

/// Request body for POST /v1/campaigns/{id}/results.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub host_id: HostId,
    #[serde(default)]
    pub rows: Vec<Row>,
    /// Set when the query failed on the host.
    #[serde(default)]
    pub error: Option<String>,
}

/// Response body for POST /v1/campaigns/{id}/results.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped: Option<usize>,
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        let (delivered, dropped) = match outcome {
            IngestOutcome::Published { delivered, dropped } => (Some(delivered), Some(dropped)),
            _ => (None, None),
        };
        Self {
            outcome: outcome.as_str(),
            delivered,
            dropped,
        }
    }
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A [`LiveQueryError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub LiveQueryError);

impl From<LiveQueryError> for ApiError {
    fn from(err: LiveQueryError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            LiveQueryError::InvalidArgument(_) | LiveQueryError::EmptyTarget => {
                StatusCode::BAD_REQUEST
            }
            LiveQueryError::NotFound { .. } => StatusCode::NOT_FOUND,
            LiveQueryError::Authorization(_) => StatusCode::FORBIDDEN,
            LiveQueryError::CampaignClosed(_) => StatusCode::CONFLICT,
            LiveQueryError::Transport(_) => StatusCode::BAD_GATEWAY,
            LiveQueryError::Persistence { .. }
            | LiveQueryError::Config(_)
            | LiveQueryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

fn query_ref(query_id: Option<QueryId>, text: String) -> QueryRef {
    QueryRef { id: query_id, text }
}

/// POST /v1/campaigns
pub async fn create_campaign(
    State(state): State<GatewayState>,
    Extension(viewer): Extension<Viewer>,
    Json(body): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    let campaign = state
        .service
        .create_campaign(&viewer, query_ref(body.query_id, body.query), body.targets)
        .await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// POST /v1/campaigns/by-names
pub async fn create_campaign_by_names(
    State(state): State<GatewayState>,
    Extension(viewer): Extension<Viewer>,
    Json(body): Json<CreateByNamesRequest>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    let campaign = state
        .service
        .create_campaign_by_names(
            &viewer,
            query_ref(body.query_id, body.query),
            body.host_names,
            body.label_names,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// GET /v1/campaigns/{id}
pub async fn get_campaign(
    State(state): State<GatewayState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<u64>,
) -> Result<Json<Campaign>, ApiError> {
    Ok(Json(state.service.get_campaign(&viewer, CampaignId(id)).await?))
}

/// DELETE /v1/campaigns/{id}
pub async fn close_campaign(
    State(state): State<GatewayState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<u64>,
) -> Result<Json<Campaign>, ApiError> {
    Ok(Json(
        state.service.close_campaign(&viewer, CampaignId(id)).await?,
    ))
}

/// POST /v1/campaigns/{id}/results
///
/// Host-side ingestion. Rejected results are reported in the body, not as
/// HTTP errors.
pub async fn post_result(
    State(state): State<GatewayState>,
    Path(id): Path<u64>,
    Json(body): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let outcome = state
        .service
        .ingest_result(CampaignId(id), body.host_id, body.rows, body.error)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(outcome.into())))
}

/// GET /health (unauthenticated)
pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let health = &state.health;
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: health.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics (unauthenticated, Prometheus text format)
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
