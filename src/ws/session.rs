//! Per-connection control session.
//!
//! A [`Session`] is created when a streaming connection opens. It registers
//! the connection for broadcasts, turns inbound control actions into
//! [`StreamController`] calls, and deregisters on close. When the last
//! connection leaves, streaming is stopped.
//!
//! A `start` is acknowledged before the broadcast loop is spawned, so the
//! requesting peer always sees `status` ahead of the first `data` frame. A
//! `stop` is acknowledged after the loop has exited, so no `data` follows
//! it.

use std::sync::Arc;

use super::messages::{ClientAction, ServerMessage};
use crate::domain::{ConnectionHandle, ConnectionId, ConnectionRegistry, DeliveryError, MessageSink};
use crate::service::StreamController;

/// Control-message interpreter bound to one registered connection.
#[derive(Debug)]
pub struct Session {
    handle: ConnectionHandle,
    registry: Arc<ConnectionRegistry>,
    stream: Arc<StreamController>,
}

impl Session {
    /// Registers `sink` as a new broadcast connection.
    pub async fn open(
        registry: Arc<ConnectionRegistry>,
        stream: Arc<StreamController>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        let handle = ConnectionHandle::new(sink);
        registry.add(handle.clone()).await;
        let connections = registry.len().await;
        tracing::info!(connection_id = %handle.id(), connections, "stream connection opened");
        Self {
            handle,
            registry,
            stream,
        }
    }

    /// Identity of this connection.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// Parses an inbound text message, acts on it, and sends the reply.
    ///
    /// Unknown or malformed input gets no reply.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the reply cannot be written, which means
    /// the connection is no longer usable. A `start` whose acknowledgement
    /// cannot be written does not start the stream.
    pub async fn handle_text(&self, text: &str) -> Result<(), DeliveryError> {
        let action = ClientAction::parse(text);
        tracing::debug!(connection_id = %self.id(), ?action, "control message");

        match action {
            ClientAction::Start => {
                self.reply(&ServerMessage::Status { streaming: true }).await?;
                self.stream.start().await;
            }
            ClientAction::Stop => {
                self.stream.stop().await;
                self.reply(&ServerMessage::Status { streaming: false }).await?;
            }
            ClientAction::Ping => self.reply(&ServerMessage::Pong).await?,
            ClientAction::Unknown => {
                tracing::debug!(connection_id = %self.id(), "ignoring unrecognized control message");
            }
        }
        Ok(())
    }

    async fn reply(&self, message: &ServerMessage) -> Result<(), DeliveryError> {
        self.handle.send(message).await
    }

    /// Deregisters the connection, stopping the stream if nobody is left.
    pub async fn close(self) {
        self.handle.close();
        self.registry.remove(self.id()).await;
        let remaining = self.registry.len().await;
        tracing::info!(connection_id = %self.id(), remaining, "stream connection closed");

        if self.stream.stop_if_unattended().await {
            tracing::info!("last connection left, streaming paused");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::connection::test_support::ChannelSink;
    use crate::domain::{FrameGenerator, GeneratorConfig};

    const START: &str = r#"{"action":"start"}"#;

    fn stream(registry: &Arc<ConnectionRegistry>) -> Arc<StreamController> {
        let config = GeneratorConfig {
            sample_rate: 0.01,
            ..GeneratorConfig::default()
        };
        let Ok(generator) = FrameGenerator::with_seed(config, 5) else {
            panic!("valid generator config");
        };
        Arc::new(StreamController::new(Arc::clone(registry), generator))
    }

    async fn open(
        registry: &Arc<ConnectionRegistry>,
        stream: &Arc<StreamController>,
    ) -> (Session, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::open(
            Arc::clone(registry),
            Arc::clone(stream),
            Arc::new(ChannelSink::new(tx)),
        )
        .await;
        (session, rx)
    }

    async fn next_json(rx: &mut mpsc::UnboundedReceiver<String>) -> serde_json::Value {
        let Ok(Some(text)) = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv()).await
        else {
            panic!("expected a message");
        };
        let Ok(value) = serde_json::from_str(&text) else {
            panic!("message is not json");
        };
        value
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn session_futures_are_send() {
        let registry = Arc::new(ConnectionRegistry::new());
        let stream = stream(&registry);
        let (tx, _rx) = mpsc::unbounded_channel();
        let opening = Session::open(
            Arc::clone(&registry),
            Arc::clone(&stream),
            Arc::new(ChannelSink::new(tx)),
        );
        assert_send(&opening);

        let session = opening.await;
        let handling = session.handle_text(START);
        assert_send(&handling);
        drop(handling);
        let closing = session.close();
        assert_send(&closing);
    }

    #[tokio::test]
    async fn open_registers_before_any_message() {
        let registry = Arc::new(ConnectionRegistry::new());
        let stream = stream(&registry);
        let (session, _rx) = open(&registry, &stream).await;
        assert!(registry.contains(session.id()).await);
    }

    #[tokio::test]
    async fn ping_replies_pong() {
        let registry = Arc::new(ConnectionRegistry::new());
        let stream = stream(&registry);
        let (session, mut rx) = open(&registry, &stream).await;

        tokio_test::assert_ok!(session.handle_text(r#"{"action":"ping"}"#).await);
        assert_eq!(next_json(&mut rx).await, serde_json::json!({"type": "pong"}));
        assert!(!stream.is_active());
    }

    #[tokio::test]
    async fn start_then_stop_reports_status() {
        let registry = Arc::new(ConnectionRegistry::new());
        let stream = stream(&registry);
        let (session, mut rx) = open(&registry, &stream).await;

        tokio_test::assert_ok!(session.handle_text(r#"{"action":"start"}"#).await);
        assert!(stream.is_active());
        assert_eq!(
            next_json(&mut rx).await,
            serde_json::json!({"type": "status", "streaming": true})
        );

        tokio_test::assert_ok!(session.handle_text(r#"{"action":"stop"}"#).await);
        assert!(!stream.is_active());

        let mut last = next_json(&mut rx).await;
        while last["type"] == "data" {
            last = next_json(&mut rx).await;
        }
        assert_eq!(last, serde_json::json!({"type": "status", "streaming": false}));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_action_is_silent() {
        let registry = Arc::new(ConnectionRegistry::new());
        let stream = stream(&registry);
        let (session, mut rx) = open(&registry, &stream).await;

        tokio_test::assert_ok!(session.handle_text(r#"{"action":"jump"}"#).await);
        tokio_test::assert_ok!(session.handle_text("garbage").await);
        assert!(rx.try_recv().is_err());
        assert!(!stream.is_active());
    }

    #[tokio::test]
    async fn last_disconnect_stops_stream() {
        let registry = Arc::new(ConnectionRegistry::new());
        let stream = stream(&registry);
        let (session, _rx) = open(&registry, &stream).await;
        let handle = session.handle.clone();

        tokio_test::assert_ok!(session.handle_text(START).await);
        assert!(stream.is_active());

        session.close().await;
        assert!(handle.is_closed());
        assert!(!stream.is_active());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn stream_survives_while_others_remain() {
        let registry = Arc::new(ConnectionRegistry::new());
        let stream = stream(&registry);
        let (first, _rx_first) = open(&registry, &stream).await;
        let (second, _rx_second) = open(&registry, &stream).await;

        tokio_test::assert_ok!(first.handle_text(START).await);
        first.close().await;
        assert!(stream.is_active());
        assert_eq!(registry.len().await, 1);

        second.close().await;
        assert!(!stream.is_active());
    }

    #[tokio::test]
    async fn unacknowledged_start_leaves_stream_idle() {
        let registry = Arc::new(ConnectionRegistry::new());
        let stream = stream(&registry);
        let (session, rx) = open(&registry, &stream).await;
        drop(rx);

        assert!(session.handle_text(START).await.is_err());
        assert!(!stream.is_active());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn start_acknowledgement_precedes_first_frame() {
        for _ in 0..200 {
            let registry = Arc::new(ConnectionRegistry::new());
            let stream = stream(&registry);
            let (session, mut rx) = open(&registry, &stream).await;

            tokio_test::assert_ok!(session.handle_text(START).await);
            assert_eq!(
                next_json(&mut rx).await,
                serde_json::json!({"type": "status", "streaming": true})
            );
            stream.stop().await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn departing_peer_never_stops_a_newcomers_stream() {
        for _ in 0..100 {
            let registry = Arc::new(ConnectionRegistry::new());
            let stream = stream(&registry);
            let (leaving, _rx_leaving) = open(&registry, &stream).await;

            let closing = tokio::spawn(leaving.close());
            let (arriving, mut rx) = open(&registry, &stream).await;
            tokio_test::assert_ok!(arriving.handle_text(START).await);
            if closing.await.is_err() {
                panic!("close task panicked");
            }

            assert!(stream.is_active());
            assert_eq!(next_json(&mut rx).await["type"], "status");
            assert_eq!(next_json(&mut rx).await["type"], "data");
            stream.stop().await;
        }
    }

    #[tokio::test]
    async fn reply_to_closed_peer_is_an_error() {
        let registry = Arc::new(ConnectionRegistry::new());
        let stream = stream(&registry);
        let (session, rx) = open(&registry, &stream).await;
        drop(rx);

        assert!(session.handle_text(r#"{"action":"ping"}"#).await.is_err());
    }
}
