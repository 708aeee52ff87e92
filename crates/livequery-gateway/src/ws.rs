// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket transport for streaming sessions.
//!
//! Server -> Client (JSON text frames):
//! ```json
//! {"type": "result", "data": {"campaign_id": 7, "host_id": 1, ...}}
//! {"type": "totals", "data": {"total_hosts": 2, ...}}
//! {"type": "status", "data": {"expected_results": 2, ...}}
//! {"type": "heartbeat"}
//! {"type": "end_of_stream", "data": {"reason": "explicit"}}
//! ```
//!
//! Client -> Server:
//! ```json
//! {"type": "cancel"}
//! ```
//!
//! Each heartbeat is followed by a WebSocket ping. The pong, like any other
//! inbound frame, tells the session the viewer is still reachable.

use async_trait::async_trait;
use axum::{
    Extension,
    body::Bytes,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use livequery_core::{
    CampaignId, LiveQueryError, StreamMessage, Viewer, ViewerConnection, ViewerSignal,
};

use crate::server::GatewayState;

/// Control frame from the viewer.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsIncoming {
    Cancel,
}

/// GET /v1/campaigns/{id}/stream
///
/// Upgrades to WebSocket and runs a streaming session on the socket.
pub async fn stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<u64>,
) -> Response {
    let tracker = state.sessions.tracker().clone();
    ws.on_upgrade(move |socket| {
        tracker.track_future(handle_socket(socket, state, viewer, CampaignId(id)))
    })
}

async fn handle_socket(
    socket: WebSocket,
    state: GatewayState,
    viewer: Viewer,
    campaign_id: CampaignId,
) {
    let conn = WsConnection::new(socket);
    let sessions = state.sessions.clone();
    let outcome = tokio::select! {
        outcome = state.service.stream_results(&viewer, campaign_id, Box::new(conn)) => outcome,
        () = sessions.stopped() => {
            tracing::debug!(%campaign_id, viewer = %viewer, "websocket session stopped by shutdown");
            return;
        }
    };
    match outcome {
        Ok(report) => tracing::debug!(
            %campaign_id,
            viewer = %viewer,
            end = %report.end,
            delivered = report.delivered,
            dropped = report.dropped,
            "websocket session finished"
        ),
        Err(e) => tracing::warn!(%campaign_id, viewer = %viewer, error = %e, "websocket session failed"),
    }
}

/// Maps one inbound frame to a viewer signal. Anything but a cancel or a
/// close proves the peer is alive.
fn classify(msg: Message) -> ViewerSignal {
    match msg {
        Message::Text(text) => {
            let text_str: &str = &text;
            match serde_json::from_str::<WsIncoming>(text_str) {
                Ok(WsIncoming::Cancel) => ViewerSignal::Cancel,
                Err(e) => {
                    tracing::debug!(error = %e, "ignoring websocket frame");
                    ViewerSignal::Alive
                }
            }
        }
        Message::Close(_) => ViewerSignal::Disconnected,
        // Pings are answered by axum; pongs answer our heartbeat pings.
        _ => ViewerSignal::Alive,
    }
}

/// A [`ViewerConnection`] over an upgraded axum WebSocket.
pub struct WsConnection {
    sender: SplitSink<WebSocket, Message>,
    receiver: SplitStream<WebSocket>,
}

impl WsConnection {
    pub fn new(socket: WebSocket) -> Self {
        let (sender, receiver) = socket.split();
        Self { sender, receiver }
    }
}

#[async_trait]
impl ViewerConnection for WsConnection {
    async fn send(&mut self, message: StreamMessage) -> Result<(), LiveQueryError> {
        let heartbeat = matches!(message, StreamMessage::Heartbeat);
        let json = serde_json::to_string(&message)
            .map_err(|e| LiveQueryError::Internal(format!("encode stream message: {e}")))?;
        self.sender
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| LiveQueryError::Transport(e.to_string()))?;
        if heartbeat {
            self.sender
                .send(Message::Ping(Bytes::new()))
                .await
                .map_err(|e| LiveQueryError::Transport(e.to_string()))?;
        }
        Ok(())
    }

    async fn next_signal(&mut self) -> ViewerSignal {
        match self.receiver.next().await {
            Some(Ok(msg)) => classify(msg),
            Some(Err(e)) => {
                tracing::debug!(error = %e, "websocket read failed");
                ViewerSignal::Disconnected
            }
            None => ViewerSignal::Disconnected,
        }
    }

    async fn close(&mut self) -> Result<(), LiveQueryError> {
        // The peer may already be gone; a failed close frame is not an error.
        let _ = self.sender.send(Message::Close(None)).await;
        self.sender
            .close()
            .await
            .map_err(|e| LiveQueryError::Transport(e.to_string()))
    }
}
