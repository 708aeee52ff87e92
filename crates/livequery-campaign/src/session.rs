// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming sessions: one viewer's long-lived connection to a campaign.
//!
//! A session moves `Opening -> Streaming -> Closing -> Closed`. While
//! streaming it waits on whichever comes first of a viewer signal, the next
//! result (or the end of the campaign), a status tick, and a heartbeat
//! tick. Every send is bounded by the heartbeat timeout, and a viewer that
//! sends nothing back (not even a reply to a heartbeat) for longer than
//! [`SessionSettings::liveness_window`] is treated as disconnected. Ending a
//! session never ends the campaign.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use strum::Display;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::debug;

use livequery_bus::{ResultBus, Subscription};
use livequery_config::CampaignConfig;
use livequery_core::{
    CampaignId, CloseReason, LiveQueryError, StreamMessage, Viewer, ViewerConnection,
    ViewerSignal,
};

use crate::recording;
use crate::store::{CampaignStore, status_report};

/// Timing knobs for streaming sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub heartbeat_interval: Duration,
    /// Upper bound on any single send to the viewer.
    pub heartbeat_timeout: Duration,
    pub status_interval: Duration,
    /// Upper bound on draining buffered results and closing the transport.
    pub flush_timeout: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &CampaignConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
            status_interval: config.status_interval(),
            flush_timeout: config.flush_timeout(),
        }
    }
}

impl SessionSettings {
    /// How long a viewer may stay silent before the session gives up on it:
    /// one heartbeat interval plus the time allowed to answer.
    pub fn liveness_window(&self) -> Duration {
        self.heartbeat_interval + self.heartbeat_timeout
    }

    /// Rejects zero periods, which would spin or panic the session timers.
    pub fn validate(&self) -> Result<(), LiveQueryError> {
        for (name, value) in [
            ("heartbeat_interval", self.heartbeat_interval),
            ("heartbeat_timeout", self.heartbeat_timeout),
            ("status_interval", self.status_interval),
        ] {
            if value.is_zero() {
                return Err(LiveQueryError::InvalidArgument(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&CampaignConfig::default())
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Opening,
    Streaming,
    Closing,
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The campaign could not be streamed; the viewer was told why.
    Rejected(String),
    ViewerCancelled,
    ViewerDisconnected,
    /// The campaign terminated and the viewer got an end-of-stream.
    CampaignClosed(CloseReason),
    /// Writing to the viewer failed or timed out.
    TransportFailed(String),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Rejected(message) => write!(f, "rejected: {message}"),
            SessionEnd::ViewerCancelled => f.write_str("viewer cancelled"),
            SessionEnd::ViewerDisconnected => f.write_str("viewer disconnected"),
            SessionEnd::CampaignClosed(reason) => write!(f, "campaign closed ({reason})"),
            SessionEnd::TransportFailed(detail) => write!(f, "transport failed: {detail}"),
        }
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub campaign_id: CampaignId,
    pub end: SessionEnd,
    /// Results written to the viewer.
    pub delivered: u64,
    /// Results the bus discarded because this session's queue was full.
    pub dropped: u64,
    pub state: SessionState,
}

/// Drives one viewer connection until it is closed.
pub struct StreamingSession {
    campaign_id: CampaignId,
    viewer: Viewer,
    store: Arc<CampaignStore>,
    bus: ResultBus,
    settings: SessionSettings,
    conn: Box<dyn ViewerConnection>,
    state: SessionState,
    delivered: u64,
}

impl StreamingSession {
    pub fn new(
        campaign_id: CampaignId,
        viewer: Viewer,
        store: Arc<CampaignStore>,
        bus: ResultBus,
        settings: SessionSettings,
        conn: Box<dyn ViewerConnection>,
    ) -> Self {
        Self {
            campaign_id,
            viewer,
            store,
            bus,
            settings,
            conn,
            state: SessionState::Opening,
            delivered: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session to `Closed`.
    pub async fn run(mut self) -> SessionReport {
        let mut subscription = match self.open().await {
            Ok(subscription) => subscription,
            Err(end) => return self.finish(None, end).await,
        };

        recording::session_started();
        let end = self.stream(&mut subscription).await;
        let report = self.finish(Some(subscription), end).await;
        recording::session_ended();
        report
    }

    /// Sends `message` as an error and closes the connection without
    /// touching any campaign.
    pub async fn reject(
        campaign_id: CampaignId,
        mut conn: Box<dyn ViewerConnection>,
        message: String,
        settings: SessionSettings,
    ) {
        debug!(%campaign_id, %message, "rejecting viewer connection");
        let _ = send_message(
            conn.as_mut(),
            settings.flush_timeout,
            StreamMessage::Error { message },
        )
        .await;
        let _ = timeout(settings.flush_timeout, conn.close()).await;
    }

    async fn open(&mut self) -> Result<Subscription, SessionEnd> {
        let id = self.campaign_id;
        let campaign = self
            .store
            .get(id)
            .await
            .map_err(|e| SessionEnd::Rejected(e.to_string()))?;
        if campaign.status.is_terminal() {
            return Err(SessionEnd::Rejected(
                LiveQueryError::CampaignClosed(id).to_string(),
            ));
        }

        let subscription = self
            .bus
            .subscribe(id)
            .map_err(|e| SessionEnd::Rejected(e.to_string()))?;
        self.store
            .mark_running(id)
            .map_err(|e| SessionEnd::Rejected(e.to_string()))?;
        debug!(
            campaign_id = %id,
            viewer = %self.viewer,
            subscription = %subscription.id(),
            "viewer attached"
        );
        Ok(subscription)
    }

    async fn stream(&mut self, subscription: &mut Subscription) -> SessionEnd {
        self.transition(SessionState::Streaming);
        if let Err(end) = self.send_progress().await {
            return end;
        }

        let send_timeout = self.settings.heartbeat_timeout;
        let start = Instant::now();
        let mut status_tick = interval_at(
            start + self.settings.status_interval,
            self.settings.status_interval,
        );
        status_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat_tick = interval_at(
            start + self.settings.heartbeat_interval,
            self.settings.heartbeat_interval,
        );
        heartbeat_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let liveness_window = self.settings.liveness_window();
        let mut last_heard = start;

        loop {
            tokio::select! {
                biased;

                signal = self.conn.next_signal() => match signal {
                    ViewerSignal::Alive => last_heard = Instant::now(),
                    ViewerSignal::Cancel => return SessionEnd::ViewerCancelled,
                    ViewerSignal::Disconnected => return SessionEnd::ViewerDisconnected,
                },

                next = subscription.recv() => match next {
                    Some(result) => {
                        let message = StreamMessage::Result(result.as_ref().clone());
                        if let Err(end) =
                            send_message(self.conn.as_mut(), send_timeout, message).await
                        {
                            return end;
                        }
                        self.delivered += 1;
                    }
                    None => {
                        let reason = subscription.close_reason().unwrap_or(CloseReason::Explicit);
                        return SessionEnd::CampaignClosed(reason);
                    }
                },

                _ = status_tick.tick() => {
                    if let Err(end) = self.send_progress().await {
                        return end;
                    }
                }

                _ = heartbeat_tick.tick() => {
                    let silent_for = Instant::now().duration_since(last_heard);
                    if silent_for > liveness_window {
                        debug!(
                            campaign_id = %self.campaign_id,
                            viewer = %self.viewer,
                            ?silent_for,
                            "viewer stopped answering heartbeats"
                        );
                        return SessionEnd::ViewerDisconnected;
                    }
                    if let Err(end) =
                        send_message(self.conn.as_mut(), send_timeout, StreamMessage::Heartbeat).await
                    {
                        return end;
                    }
                }
            }
        }
    }

    /// Sends the current totals and status. A campaign that is no longer
    /// active sends nothing; its end-of-stream is already on the way.
    async fn send_progress(&mut self) -> Result<(), SessionEnd> {
        let Some(campaign) = self.store.snapshot(self.campaign_id) else {
            return Ok(());
        };
        let send_timeout = self.settings.heartbeat_timeout;
        send_message(
            self.conn.as_mut(),
            send_timeout,
            StreamMessage::Totals(campaign.metrics),
        )
        .await?;
        send_message(
            self.conn.as_mut(),
            send_timeout,
            StreamMessage::Status(status_report(&campaign)),
        )
        .await
    }

    async fn finish(
        &mut self,
        subscription: Option<Subscription>,
        end: SessionEnd,
    ) -> SessionReport {
        self.transition(SessionState::Closing);

        let mut dropped = 0;
        if let Some(mut subscription) = subscription {
            subscription.unsubscribe();
            if end == SessionEnd::ViewerCancelled {
                self.flush(&mut subscription).await;
            }
            dropped = subscription.dropped();
        }

        let farewell = match &end {
            SessionEnd::Rejected(message) => Some(StreamMessage::Error {
                message: message.clone(),
            }),
            SessionEnd::CampaignClosed(reason) => {
                Some(StreamMessage::EndOfStream { reason: *reason })
            }
            _ => None,
        };
        if let Some(message) = farewell {
            if let Err(e) =
                send_message(self.conn.as_mut(), self.settings.flush_timeout, message).await
            {
                debug!(campaign_id = %self.campaign_id, error = %e, "final message not delivered");
            }
        }
        match timeout(self.settings.flush_timeout, self.conn.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(campaign_id = %self.campaign_id, error = %e, "close failed"),
            Err(_) => debug!(campaign_id = %self.campaign_id, "close timed out"),
        }

        self.store.touch(self.campaign_id);
        self.transition(SessionState::Closed);
        debug!(
            campaign_id = %self.campaign_id,
            viewer = %self.viewer,
            %end,
            delivered = self.delivered,
            dropped,
            "session closed"
        );

        SessionReport {
            campaign_id: self.campaign_id,
            end,
            delivered: self.delivered,
            dropped,
            state: self.state,
        }
    }

    /// Delivers results still queued for this session, bounded by the
    /// flush timeout.
    async fn flush(&mut self, subscription: &mut Subscription) {
        let deadline = Instant::now() + self.settings.flush_timeout;
        while let Some(result) = subscription.try_recv() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let message = StreamMessage::Result(result.as_ref().clone());
            match timeout(remaining, self.conn.send(message)).await {
                Ok(Ok(())) => self.delivered += 1,
                _ => break,
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(campaign_id = %self.campaign_id, from = %self.state, to = %next, "session state");
        self.state = next;
    }
}

async fn send_message(
    conn: &mut dyn ViewerConnection,
    limit: Duration,
    message: StreamMessage,
) -> Result<(), SessionEnd> {
    match timeout(limit, conn.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SessionEnd::TransportFailed(e.to_string())),
        Err(_) => Err(SessionEnd::TransportFailed(format!(
            "viewer did not accept a message within {limit:?}"
        ))),
    }
}
