// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background expiration of idle campaigns.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::store::CampaignStore;

/// Spawns a task that, every `interval`, closes campaigns with no
/// subscribers and no activity for at least `horizon`.
pub fn spawn_expiration_sweep(
    store: Arc<CampaignStore>,
    interval: Duration,
    horizon: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let horizon = chrono::Duration::from_std(horizon).unwrap_or(chrono::TimeDelta::MAX);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("expiration sweep stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let expired = store.expire_idle(horizon, Utc::now()).await;
                    if !expired.is_empty() {
                        info!(count = expired.len(), "expired idle campaigns");
                    }
                }
            }
        }
    })
}
