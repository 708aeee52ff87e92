// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted viewer connection for deterministic session tests.
//!
//! [`ScriptedConnection`] is handed to the session under test; the paired
//! [`ConnectionHandle`] stays with the test to inject viewer signals,
//! inspect captured messages, and make sends fail or stall.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, mpsc};

use livequery_core::{LiveQueryError, StreamMessage, ViewerConnection, ViewerSignal};

struct Shared {
    sent: Mutex<Vec<StreamMessage>>,
    notify: Notify,
    fail_sends: AtomicBool,
    stall_sends: AtomicBool,
    mute: AtomicBool,
    closed: AtomicBool,
}

/// Viewer connection whose peer is a test.
///
/// Every heartbeat is answered with [`ViewerSignal::Alive`] unless the
/// handle muted the peer. Dropping the [`ConnectionHandle`] looks like the
/// peer going away.
pub struct ScriptedConnection {
    shared: Arc<Shared>,
    signals: mpsc::UnboundedReceiver<ViewerSignal>,
    unanswered: usize,
}

/// Test-side controls for a [`ScriptedConnection`].
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
    signals: mpsc::UnboundedSender<ViewerSignal>,
}

impl ScriptedConnection {
    pub fn new() -> (Self, ConnectionHandle) {
        let shared = Arc::new(Shared {
            sent: Mutex::new(Vec::new()),
            notify: Notify::new(),
            fail_sends: AtomicBool::new(false),
            stall_sends: AtomicBool::new(false),
            mute: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                shared: Arc::clone(&shared),
                signals: rx,
                unanswered: 0,
            },
            ConnectionHandle {
                shared,
                signals: tx,
            },
        )
    }
}

impl ConnectionHandle {
    /// The viewer asks to stop streaming.
    pub fn cancel(&self) {
        let _ = self.signals.send(ViewerSignal::Cancel);
    }

    /// The viewer's transport goes away.
    pub fn disconnect(&self) {
        let _ = self.signals.send(ViewerSignal::Disconnected);
    }

    /// Makes every subsequent send fail with a transport error.
    pub fn fail_sends(&self, fail: bool) {
        self.shared.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent send hang forever, like a half-open socket.
    pub fn stall_sends(&self, stall: bool) {
        self.shared.stall_sends.store(stall, Ordering::SeqCst);
    }

    /// Keeps accepting sends but stops answering heartbeats, like a peer
    /// that vanished without closing its socket.
    pub fn mute(&self, mute: bool) {
        self.shared.mute.store(mute, Ordering::SeqCst);
    }

    /// Whether the session closed the connection.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// All messages sent so far.
    pub async fn sent_messages(&self) -> Vec<StreamMessage> {
        self.shared.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.shared.sent.lock().await.len()
    }

    /// Waits until a sent message satisfies `predicate`, returning every
    /// message sent up to that point. `None` on timeout.
    pub async fn wait_for<F>(&self, timeout: Duration, predicate: F) -> Option<Vec<StreamMessage>>
    where
        F: Fn(&StreamMessage) -> bool,
    {
        let wait = async {
            loop {
                let notified = self.shared.notify.notified();
                {
                    let sent = self.shared.sent.lock().await;
                    if sent.iter().any(&predicate) {
                        return sent.clone();
                    }
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.ok()
    }
}

#[async_trait]
impl ViewerConnection for ScriptedConnection {
    async fn send(&mut self, message: StreamMessage) -> Result<(), LiveQueryError> {
        if self.shared.stall_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.shared.fail_sends.load(Ordering::SeqCst) {
            return Err(LiveQueryError::Transport("injected send failure".into()));
        }
        if matches!(message, StreamMessage::Heartbeat) && !self.shared.mute.load(Ordering::SeqCst) {
            self.unanswered += 1;
        }
        self.shared.sent.lock().await.push(message);
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn next_signal(&mut self) -> ViewerSignal {
        if self.unanswered > 0 {
            self.unanswered -= 1;
            return ViewerSignal::Alive;
        }
        self.signals
            .recv()
            .await
            .unwrap_or(ViewerSignal::Disconnected)
    }

    async fn close(&mut self) -> Result<(), LiveQueryError> {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
        Ok(())
    }
}
