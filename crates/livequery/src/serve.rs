// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `livequery serve` command implementation.
//!
//! Opens SQLite storage, expires campaigns left unfinished by a previous
//! run, starts the campaign manager with its expiration sweep, and serves
//! the gateway until SIGINT/SIGTERM.

use std::sync::Arc;

use livequery_campaign::{
    CampaignManager, CampaignService, Collaborators, LoggingCampaignService, recording,
};
use livequery_config::LiveQueryConfig;
use livequery_core::{CloseReason, LiveQueryError};
use livequery_gateway::{AuthConfig, GatewayState, HealthState, Sessions, start_server};
use livequery_storage::SqliteStorage;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

use crate::shutdown;

/// Runs the `livequery serve` command.
pub async fn run_serve(config: LiveQueryConfig) -> Result<(), LiveQueryError> {
    init_tracing(&config.log_level);
    info!("starting livequery serve");

    let prometheus = install_prometheus()?;

    let storage = Arc::new(SqliteStorage::open(&config.storage).await?);
    storage.health_check().await?;

    let auth = AuthConfig::new(config.gateway.bearer_tokens.clone());
    if auth.is_empty() {
        warn!("no gateway bearer tokens configured -- every API request will be rejected");
    }

    let manager = CampaignManager::open(
        &config.campaign,
        Collaborators {
            datastore: storage.clone(),
            queries: storage.clone(),
            persistence: storage.clone(),
            authorizer: Arc::new(auth.clone()),
        },
    )
    .await?;

    let expired = expire_orphans(&storage, &manager).await?;
    if expired > 0 {
        info!(count = expired, "expired campaigns left open by a previous run");
    }

    let cancel = shutdown::install_signal_handler();
    let sweep = manager.spawn_expiration_sweep(cancel.clone());

    let service: Arc<dyn CampaignService> = Arc::new(LoggingCampaignService::new(manager));
    let state = GatewayState {
        service,
        auth,
        health: HealthState::new(Some(Arc::new(move || prometheus.render()))),
        sessions: Sessions::new(),
    };

    // Returns only after open WebSocket sessions have been drained.
    let served = start_server(&config.gateway, state, cancel.clone()).await;
    cancel.cancel();
    if let Err(e) = sweep.await {
        warn!(error = %e, "expiration sweep task failed");
    }

    match Arc::try_unwrap(storage) {
        Ok(storage) => storage.close().await?,
        Err(_) => warn!("storage still in use after shutdown, skipping WAL checkpoint"),
    }

    info!("livequery stopped");
    served
}

/// Closes every campaign the database still lists as unfinished. Called
/// before the gateway starts, so none of them can have live viewers.
async fn expire_orphans(
    storage: &SqliteStorage,
    manager: &CampaignManager,
) -> Result<usize, LiveQueryError> {
    let orphans = storage.unfinished_campaigns().await?;
    let count = orphans.len();
    for orphan in orphans {
        manager.store().close(orphan.id, CloseReason::Expired).await?;
    }
    Ok(count)
}

fn install_prometheus() -> Result<PrometheusHandle, LiveQueryError> {
    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        LiveQueryError::Internal(format!("failed to install Prometheus recorder: {e}"))
    })?;
    recording::register_metrics();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// `log_level` is either a bare level applied to the livequery crates or a
/// full filter directive.
fn filter_directive(log_level: &str) -> String {
    if log_level.contains('=') || log_level.contains(',') {
        log_level.to_string()
    } else {
        format!("livequery={log_level},warn")
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
