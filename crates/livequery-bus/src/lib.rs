// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process result bus keyed by campaign.
//!
//! Each open campaign has a topic holding the senders of its subscribers.
//! Every subscriber owns a bounded queue; [`ResultBus::publish`] snapshots the
//! senders under a read lock and delivers outside it with `try_send`, so a
//! stalled viewer can never hold up the publisher or other viewers.
//!
//! Overflow policy is **drop-newest**: when a subscriber's queue is full the
//! incoming result is discarded for that subscriber only and its drop counter
//! is incremented. Results already queued are never evicted, so a subscriber
//! always sees a gap-free prefix followed by whatever fits after it drains.
//!
//! Closing a topic drops every sender. Subscribers drain what is already
//! queued and then observe end-of-stream (`recv()` returning `None`), with the
//! close reason available from [`Subscription::close_reason`].

mod subscription;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use livequery_core::{CampaignId, CloseReason, HostResult, LiveQueryError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

pub use subscription::{Subscription, SubscriptionId};

/// Outcome of a single [`ResultBus::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers whose queue accepted the result.
    pub delivered: usize,
    /// Subscribers whose queue was full.
    pub dropped: usize,
}

struct Slot {
    id: SubscriptionId,
    tx: mpsc::Sender<Arc<HostResult>>,
    dropped: Arc<AtomicU64>,
}

struct Topic {
    slots: Vec<Slot>,
    closed_tx: watch::Sender<Option<CloseReason>>,
}

pub(crate) struct BusInner {
    topics: RwLock<HashMap<CampaignId, Topic>>,
    capacity: usize,
    next_subscription: AtomicU64,
}

impl BusInner {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<CampaignId, Topic>> {
        self.topics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CampaignId, Topic>> {
        self.topics.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn remove_slot(&self, campaign_id: CampaignId, id: SubscriptionId) -> bool {
        let mut topics = self.write();
        let Some(topic) = topics.get_mut(&campaign_id) else {
            return false;
        };
        let before = topic.slots.len();
        topic.slots.retain(|slot| slot.id != id);
        before != topic.slots.len()
    }
}

/// Per-campaign publish/subscribe hub. Cheap to clone.
#[derive(Clone)]
pub struct ResultBus {
    inner: Arc<BusInner>,
}

impl ResultBus {
    /// Creates a bus whose subscribers each buffer up to `capacity` results.
    ///
    /// A `capacity` of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                topics: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    /// Per-subscriber queue length.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Opens the topic for a newly registered campaign. Idempotent.
    pub fn open_topic(&self, campaign_id: CampaignId) {
        let mut topics = self.inner.write();
        topics.entry(campaign_id).or_insert_with(|| {
            debug!(%campaign_id, "result topic opened");
            Topic {
                slots: Vec::new(),
                closed_tx: watch::Sender::new(None),
            }
        });
    }

    /// Tears down a campaign's topic.
    ///
    /// New subscriptions are rejected from here on and every existing
    /// subscriber observes end-of-stream once its queue is drained. Returns
    /// the number of subscribers that were attached, or `None` if the topic
    /// was not open.
    pub fn close_topic(&self, campaign_id: CampaignId, reason: CloseReason) -> Option<usize> {
        let topic = self.inner.write().remove(&campaign_id)?;
        let attached = topic.slots.len();
        topic.closed_tx.send_replace(Some(reason));
        debug!(%campaign_id, %reason, attached, "result topic closed");
        Some(attached)
    }

    pub fn is_open(&self, campaign_id: CampaignId) -> bool {
        self.inner.read().contains_key(&campaign_id)
    }

    /// Number of subscribers currently attached to a campaign.
    pub fn subscriber_count(&self, campaign_id: CampaignId) -> usize {
        self.inner
            .read()
            .get(&campaign_id)
            .map_or(0, |topic| topic.slots.len())
    }

    /// Subscribes to every result published for `campaign_id` from now on.
    ///
    /// There is no backlog replay. Fails with
    /// [`LiveQueryError::CampaignClosed`] when the topic is not open.
    pub fn subscribe(&self, campaign_id: CampaignId) -> Result<Subscription, LiveQueryError> {
        let mut topics = self.inner.write();
        let topic = topics
            .get_mut(&campaign_id)
            .ok_or(LiveQueryError::CampaignClosed(campaign_id))?;

        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        topic.slots.push(Slot {
            id,
            tx,
            dropped: Arc::clone(&dropped),
        });
        let closed_rx = topic.closed_tx.subscribe();
        debug!(%campaign_id, subscription = %id, "subscribed");

        Ok(Subscription::new(
            id,
            campaign_id,
            rx,
            closed_rx,
            dropped,
            Arc::downgrade(&self.inner),
        ))
    }

    /// Removes a subscription. Safe to call more than once.
    pub fn unsubscribe(&self, subscription: &mut Subscription) {
        subscription.unsubscribe();
    }

    /// Delivers `result` to every subscriber of `campaign_id` without waiting.
    ///
    /// Publishing to an unknown or closed campaign is a no-op.
    pub fn publish(&self, campaign_id: CampaignId, result: HostResult) -> PublishReport {
        let targets: Vec<(SubscriptionId, mpsc::Sender<Arc<HostResult>>, Arc<AtomicU64>)> = {
            let topics = self.inner.read();
            let Some(topic) = topics.get(&campaign_id) else {
                debug!(%campaign_id, "publish to closed or unknown campaign ignored");
                return PublishReport::default();
            };
            topic
                .slots
                .iter()
                .map(|slot| (slot.id, slot.tx.clone(), Arc::clone(&slot.dropped)))
                .collect()
        };

        let result = Arc::new(result);
        let mut report = PublishReport::default();
        for (id, tx, dropped) in targets {
            match tx.try_send(Arc::clone(&result)) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    report.dropped += 1;
                    if warn_on_drop(total) {
                        warn!(
                            %campaign_id,
                            subscription = %id,
                            dropped_total = total,
                            "subscriber queue full, result dropped"
                        );
                    } else {
                        debug!(%campaign_id, subscription = %id, dropped_total = total, "result dropped");
                    }
                }
                // Receiver went away between snapshot and send.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        report
    }
}

impl std::fmt::Debug for ResultBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultBus")
            .field("capacity", &self.inner.capacity)
            .field("topics", &self.inner.read().len())
            .finish()
    }
}

/// A stalled subscriber warns on its 1st, 2nd, 4th, 8th... drop only.
fn warn_on_drop(total: u64) -> bool {
    total.is_power_of_two()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use livequery_core::{HostId, ResultOutcome, Row};

    use super::*;

    const CAMPAIGN: CampaignId = CampaignId(1);

    fn result(host: u64, seq: u64) -> HostResult {
        let mut row = Row::new();
        row.insert("seq".to_string(), seq.to_string());
        HostResult {
            campaign_id: CAMPAIGN,
            host_id: HostId(host),
            outcome: ResultOutcome::Rows(vec![row]),
            received_at: Utc::now(),
        }
    }

    fn seq_of(result: &HostResult) -> u64 {
        match &result.outcome {
            ResultOutcome::Rows(rows) => rows[0]["seq"].parse().unwrap(),
            ResultOutcome::Error(e) => panic!("unexpected error outcome {e}"),
        }
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let bus = ResultBus::new(16);
        bus.open_topic(CAMPAIGN);
        let mut sub = bus.subscribe(CAMPAIGN).unwrap();

        for seq in 0..10 {
            let report = bus.publish(CAMPAIGN, result(seq, seq));
            assert_eq!(report.delivered, 1);
        }
        for seq in 0..10 {
            let got = sub.recv().await.unwrap();
            assert_eq!(seq_of(&got), seq);
        }
    }

    #[tokio::test]
    async fn late_subscriber_sees_no_backlog() {
        let bus = ResultBus::new(16);
        bus.open_topic(CAMPAIGN);
        let mut early = bus.subscribe(CAMPAIGN).unwrap();
        bus.publish(CAMPAIGN, result(1, 1));

        let mut late = bus.subscribe(CAMPAIGN).unwrap();
        bus.publish(CAMPAIGN, result(2, 2));

        assert_eq!(seq_of(&early.recv().await.unwrap()), 1);
        assert_eq!(seq_of(&early.recv().await.unwrap()), 2);
        assert_eq!(seq_of(&late.recv().await.unwrap()), 2);
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn stalled_subscriber_never_delays_healthy_one() {
        let capacity = 4;
        let bus = ResultBus::new(capacity);
        bus.open_topic(CAMPAIGN);
        let stalled = bus.subscribe(CAMPAIGN).unwrap();
        let mut healthy = bus.subscribe(CAMPAIGN).unwrap();

        let n = 50u64;
        for seq in 0..n {
            bus.publish(CAMPAIGN, result(seq, seq));
            let got = tokio::time::timeout(Duration::from_secs(1), healthy.recv())
                .await
                .expect("healthy subscriber must not wait on the stalled one")
                .unwrap();
            assert_eq!(seq_of(&got), seq);
        }

        assert_eq!(healthy.dropped(), 0);
        assert_eq!(stalled.dropped(), n - capacity as u64);
    }

    #[tokio::test]
    async fn overflow_drops_newest() {
        let bus = ResultBus::new(2);
        bus.open_topic(CAMPAIGN);
        let mut sub = bus.subscribe(CAMPAIGN).unwrap();

        assert_eq!(bus.publish(CAMPAIGN, result(1, 1)).delivered, 1);
        assert_eq!(bus.publish(CAMPAIGN, result(2, 2)).delivered, 1);
        let report = bus.publish(CAMPAIGN, result(3, 3));
        assert_eq!(report, PublishReport { delivered: 0, dropped: 1 });

        assert_eq!(seq_of(&sub.recv().await.unwrap()), 1);
        assert_eq!(seq_of(&sub.recv().await.unwrap()), 2);
        assert!(sub.try_recv().is_none());
        assert_eq!(sub.dropped(), 1);
    }

    #[tokio::test]
    async fn no_delivery_after_unsubscribe() {
        let bus = ResultBus::new(8);
        bus.open_topic(CAMPAIGN);
        let mut sub = bus.subscribe(CAMPAIGN).unwrap();
        assert_eq!(bus.subscriber_count(CAMPAIGN), 1);

        bus.unsubscribe(&mut sub);
        bus.unsubscribe(&mut sub);
        assert_eq!(bus.subscriber_count(CAMPAIGN), 0);

        let report = bus.publish(CAMPAIGN, result(1, 1));
        assert_eq!(report.delivered, 0);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropping_subscription_deregisters() {
        let bus = ResultBus::new(8);
        bus.open_topic(CAMPAIGN);
        let sub = bus.subscribe(CAMPAIGN).unwrap();
        assert_eq!(bus.subscriber_count(CAMPAIGN), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(CAMPAIGN), 0);
    }

    #[tokio::test]
    async fn close_ends_every_stream_and_rejects_new_subscribers() {
        let bus = ResultBus::new(8);
        bus.open_topic(CAMPAIGN);
        let mut a = bus.subscribe(CAMPAIGN).unwrap();
        let mut b = bus.subscribe(CAMPAIGN).unwrap();
        bus.publish(CAMPAIGN, result(1, 1));

        assert_eq!(bus.close_topic(CAMPAIGN, CloseReason::Explicit), Some(2));
        assert_eq!(bus.close_topic(CAMPAIGN, CloseReason::Explicit), None);

        // Buffered results drain first, then end-of-stream.
        assert_eq!(seq_of(&a.recv().await.unwrap()), 1);
        assert!(a.recv().await.is_none());
        assert_eq!(a.close_reason(), Some(CloseReason::Explicit));
        assert_eq!(seq_of(&b.recv().await.unwrap()), 1);
        assert!(b.recv().await.is_none());

        match bus.subscribe(CAMPAIGN) {
            Err(LiveQueryError::CampaignClosed(id)) => assert_eq!(id, CAMPAIGN),
            other => panic!("expected CampaignClosed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wait_closed_resolves_on_close() {
        let bus = ResultBus::new(8);
        bus.open_topic(CAMPAIGN);
        let mut sub = bus.subscribe(CAMPAIGN).unwrap();
        assert_eq!(sub.close_reason(), None);

        let closer = bus.clone();
        tokio::spawn(async move {
            closer.close_topic(CAMPAIGN, CloseReason::Expired);
        });
        assert_eq!(sub.closed().await, Some(CloseReason::Expired));
    }

    #[test]
    fn publish_to_unknown_campaign_is_noop() {
        let bus = ResultBus::new(8);
        assert_eq!(
            bus.publish(CampaignId(99), result(1, 1)),
            PublishReport::default()
        );
        assert!(!bus.is_open(CampaignId(99)));
    }

    #[test]
    fn subscribe_to_unopened_topic_fails() {
        let bus = ResultBus::new(8);
        assert!(matches!(
            bus.subscribe(CAMPAIGN),
            Err(LiveQueryError::CampaignClosed(_))
        ));
    }

    #[test]
    fn recv_is_pending_while_open_and_empty() {
        let bus = ResultBus::new(8);
        bus.open_topic(CAMPAIGN);
        let mut sub = bus.subscribe(CAMPAIGN).unwrap();
        let mut recv = tokio_test::task::spawn(sub.recv());
        tokio_test::assert_pending!(recv.poll());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        assert_eq!(ResultBus::new(0).capacity(), 1);
    }

    #[test]
    fn drop_warnings_back_off() {
        let warned: Vec<u64> = (1..=20).filter(|n| warn_on_drop(*n)).collect();
        assert_eq!(warned, vec![1, 2, 4, 8, 16]);
    }
}
