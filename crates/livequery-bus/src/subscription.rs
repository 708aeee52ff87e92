// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A viewer's live interest in one campaign's results.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use livequery_core::{CampaignId, CloseReason, HostResult};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::BusInner;

/// Bus-unique subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiving end of a campaign topic.
///
/// Deregisters itself from the bus when dropped.
pub struct Subscription {
    id: SubscriptionId,
    campaign_id: CampaignId,
    created_at: DateTime<Utc>,
    rx: mpsc::Receiver<Arc<HostResult>>,
    closed: watch::Receiver<Option<CloseReason>>,
    dropped: Arc<AtomicU64>,
    bus: Weak<BusInner>,
    registered: bool,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        campaign_id: CampaignId,
        rx: mpsc::Receiver<Arc<HostResult>>,
        closed: watch::Receiver<Option<CloseReason>>,
        dropped: Arc<AtomicU64>,
        bus: Weak<BusInner>,
    ) -> Self {
        Self {
            id,
            campaign_id,
            created_at: Utc::now(),
            rx,
            closed,
            dropped,
            bus,
            registered: true,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn campaign_id(&self) -> CampaignId {
        self.campaign_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Next result, or `None` once the stream has ended (campaign closed and
    /// queue drained, or unsubscribed and queue drained). Cancel-safe.
    pub async fn recv(&mut self) -> Option<Arc<HostResult>> {
        self.rx.recv().await
    }

    /// Next already-queued result, without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<HostResult>> {
        self.rx.try_recv().ok()
    }

    /// Results discarded because this subscriber's queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Why the campaign closed, once it has.
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.closed.borrow()
    }

    /// Resolves when the campaign closes. Returns `None` if the bus itself
    /// was dropped without closing the topic.
    pub async fn closed(&mut self) -> Option<CloseReason> {
        match self.closed.wait_for(Option::is_some).await {
            Ok(reason) => *reason,
            Err(_) => None,
        }
    }

    /// Deregisters from the bus. Results already queued stay readable; no
    /// new result is accepted. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;
        self.rx.close();
        if let Some(bus) = self.bus.upgrade() {
            if bus.remove_slot(self.campaign_id, self.id) {
                debug!(campaign_id = %self.campaign_id, subscription = %self.id, "unsubscribed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("campaign_id", &self.campaign_id)
            .field("created_at", &self.created_at)
            .field("registered", &self.registered)
            .field("dropped", &self.dropped())
            .finish()
    }
}
