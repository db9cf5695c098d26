//! WebSocket read loop for a single streaming connection.
//!
//! The socket is split: the writer half becomes a [`WsSink`] shared by the
//! broadcast loop and the session's control replies, while the reader half
//! is drained here and fed to the [`Session`].

use std::fmt;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::future::BoxFuture;
use futures_util::stream::SplitSink;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::sync::Mutex;

use super::session::Session;
use crate::app_state::AppState;
use crate::domain::{DeliveryError, MessageSink};

/// Writer half of an axum WebSocket.
///
/// Writes are serialized by an async mutex so frames and control replies
/// never interleave mid-message.
pub struct WsSink {
    inner: Mutex<SplitSink<WebSocket, Message>>,
}

impl fmt::Debug for WsSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsSink").finish_non_exhaustive()
    }
}

impl WsSink {
    /// Wraps the writer half of a split socket.
    #[must_use]
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            inner: Mutex::new(sink),
        }
    }
}

impl MessageSink for WsSink {
    fn deliver<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<(), DeliveryError>> {
        async move {
            let mut sink = self.inner.lock().await;
            sink.send(Message::text(String::from(text)))
                .await
                .map_err(|e| DeliveryError::Transport(e.to_string()))
        }
        .boxed()
    }
}

/// Runs the read loop for a single WebSocket connection.
///
/// - Registers the connection before reading anything.
/// - Dispatches text frames as control messages.
/// - On close, read error, or failed reply, deregisters the connection.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (ws_tx, mut ws_rx) = socket.split();
    let session = Session::open(
        Arc::clone(&state.registry),
        Arc::clone(&state.stream),
        Arc::new(WsSink::new(ws_tx)),
    )
    .await;

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(err) = session.handle_text(text.as_str()).await {
                    tracing::debug!(connection_id = %session.id(), error = %err, "reply failed");
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(connection_id = %session.id(), error = %err, "ws read error");
                break;
            }
        }
    }

    session.close().await;
}
