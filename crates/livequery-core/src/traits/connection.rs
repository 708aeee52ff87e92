// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Duplex viewer connection used by streaming sessions.

use async_trait::async_trait;

use crate::error::LiveQueryError;
use crate::types::{StreamMessage, ViewerSignal};

/// An abstract viewer connection.
///
/// The streaming session waits on [`next_signal`](Self::next_signal) inside a
/// `select!` and drops the future whenever another branch wins, so
/// implementations must be cancel-safe there.
#[async_trait]
pub trait ViewerConnection: Send {
    /// Sends one application message to the viewer. Transports that can
    /// solicit a reply (a WebSocket ping) do so on
    /// [`StreamMessage::Heartbeat`], so a live peer answers with
    /// [`ViewerSignal::Alive`].
    async fn send(&mut self, message: StreamMessage) -> Result<(), LiveQueryError>;

    /// Resolves on the next viewer-initiated event. Any other inbound
    /// traffic resolves as [`ViewerSignal::Alive`].
    async fn next_signal(&mut self) -> ViewerSignal;

    /// Attempts a clean close of the underlying transport.
    async fn close(&mut self) -> Result<(), LiveQueryError>;
}
