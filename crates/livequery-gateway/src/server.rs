// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;

use livequery_campaign::CampaignService;
use livequery_config::GatewayConfig;
use livequery_core::LiveQueryError;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;
use crate::ws;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl HealthState {
    pub fn new(prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>) -> Self {
        Self {
            start_time: std::time::Instant::now(),
            prometheus_render,
        }
    }
}

/// How long [`serve`] waits for stopped WebSocket sessions to unwind.
const SESSION_DRAIN: Duration = Duration::from_secs(5);

/// Upgraded WebSocket sessions. axum's graceful shutdown does not wait for
/// them, so [`serve`] stops and drains them itself.
#[derive(Clone, Default)]
pub struct Sessions {
    tracker: TaskTracker,
    stop: CancellationToken,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Resolves once the sessions have been told to stop.
    pub(crate) async fn stopped(&self) {
        self.stop.cancelled().await
    }

    /// Stops every session and waits up to `grace` for them to finish.
    /// Returns false if some were still running when `grace` ran out.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.stop.cancel();
        self.tracker.close();
        tokio::time::timeout(grace, self.tracker.wait()).await.is_ok()
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub service: Arc<dyn CampaignService>,
    pub auth: AuthConfig,
    pub health: HealthState,
    pub sessions: Sessions,
}

/// Builds the gateway router.
///
/// - GET /health, GET /metrics (public)
/// - POST /v1/campaigns, POST /v1/campaigns/by-names
/// - GET, DELETE /v1/campaigns/{id}
/// - POST /v1/campaigns/{id}/results
/// - GET /v1/campaigns/{id}/stream (WebSocket)
pub fn router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    // Unauthenticated public routes (health + metrics for systemd and Prometheus).
    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route("/metrics", get(handlers::get_public_metrics))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/campaigns", post(handlers::create_campaign))
        .route("/v1/campaigns/by-names", post(handlers::create_campaign_by_names))
        .route(
            "/v1/campaigns/{id}",
            get(handlers::get_campaign).delete(handlers::close_campaign),
        )
        .route("/v1/campaigns/{id}/results", post(handlers::post_result))
        .route("/v1/campaigns/{id}/stream", get(ws::stream_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
}

/// Binds to the configured host:port and serves until `cancel` fires.
pub async fn start_server(
    config: &GatewayConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), LiveQueryError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| LiveQueryError::Transport(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("Gateway server listening on {addr}");
    serve(listener, state, cancel).await
}

/// Serves the gateway on an already bound listener. Once `cancel` fires
/// and the HTTP connections are done, open WebSocket sessions are stopped
/// and awaited before returning.
pub async fn serve(
    listener: TcpListener,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), LiveQueryError> {
    let sessions = state.sessions.clone();
    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| LiveQueryError::Transport(format!("gateway server error: {e}")));

    let open = sessions.len();
    if sessions.drain(SESSION_DRAIN).await {
        tracing::debug!(sessions = open, "websocket sessions drained");
    } else {
        tracing::warn!(
            remaining = sessions.len(),
            "websocket sessions still running after shutdown grace period"
        );
    }
    served
}
