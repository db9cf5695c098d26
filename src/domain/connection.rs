//! Connection handles and the outbound delivery seam.
//!
//! A [`ConnectionHandle`] is what the registry stores and what the broadcast
//! loop writes to. It pairs a [`ConnectionId`] with a shared
//! [`MessageSink`]; the handle never owns the underlying transport, it only
//! keeps a reference to the writer half.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use serde::Serialize;

use super::ConnectionId;

/// Failure to hand a message to a connection.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The connection was closed, or an earlier write to it failed.
    #[error("connection closed")]
    Closed,

    /// The transport rejected the write.
    #[error("transport error: {0}")]
    Transport(String),

    /// The message could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Writer half of a connection, as seen by the streaming core.
///
/// Implementations must serialize concurrent writers themselves; the
/// broadcast loop and the connection's own control replies may call
/// [`MessageSink::deliver`] at the same time.
pub trait MessageSink: Send + Sync + 'static {
    /// Writes one text message to the peer.
    fn deliver<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<(), DeliveryError>>;
}

/// Registry entry for one live connection.
///
/// Cloning is cheap and yields a handle to the same sink. Equality is by
/// [`ConnectionId`] only.
///
/// Once [`ConnectionHandle::close`] is called, or a write fails, every
/// clone refuses further writes with [`DeliveryError::Closed`] without
/// touching the sink.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sink: Arc<dyn MessageSink>,
    closed: Arc<AtomicBool>,
}

impl ConnectionHandle {
    /// Creates a handle with a fresh [`ConnectionId`].
    #[must_use]
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            id: ConnectionId::new(),
            sink,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the identity of this connection.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Marks the connection closed for this handle and all its clones.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns `true` after [`close`](Self::close) or a failed write.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Writes pre-serialized text to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Closed`] if the handle is already closed,
    /// otherwise whatever the sink reports. A sink failure closes the handle.
    pub async fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        let result = self.sink.deliver(text).await;
        if result.is_err() {
            self.close();
        }
        result
    }

    /// Serializes `message` as JSON and writes it to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] on serialization or write failure.
    pub async fn send<T: Serialize + Sync>(&self, message: &T) -> Result<(), DeliveryError> {
        let text = serde_json::to_string(message)?;
        self.deliver(&text).await
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Channel-backed sinks for exercising the streaming core without sockets.

    use futures_util::FutureExt;
    use tokio::sync::mpsc;

    use super::*;

    /// Forwards every delivered message into an unbounded channel.
    #[derive(Debug)]
    pub(crate) struct ChannelSink {
        tx: mpsc::UnboundedSender<String>,
    }

    impl ChannelSink {
        pub(crate) fn new(tx: mpsc::UnboundedSender<String>) -> Self {
            Self { tx }
        }
    }

    impl MessageSink for ChannelSink {
        fn deliver<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<(), DeliveryError>> {
            let result = self
                .tx
                .send(text.to_owned())
                .map_err(|_| DeliveryError::Closed);
            async move { result }.boxed()
        }
    }

    /// Waits `delay` before forwarding each message, like a slow peer.
    #[derive(Debug)]
    pub(crate) struct SlowSink {
        tx: mpsc::UnboundedSender<String>,
        delay: std::time::Duration,
    }

    impl MessageSink for SlowSink {
        fn deliver<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<(), DeliveryError>> {
            async move {
                tokio::time::sleep(self.delay).await;
                self.tx
                    .send(text.to_owned())
                    .map_err(|_| DeliveryError::Closed)
            }
            .boxed()
        }
    }

    /// Rejects every write.
    #[derive(Debug)]
    pub(crate) struct FailingSink;

    impl MessageSink for FailingSink {
        fn deliver<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Result<(), DeliveryError>> {
            async { Err(DeliveryError::Transport("broken pipe".to_string())) }.boxed()
        }
    }

    /// Builds a handle whose deliveries arrive on the returned receiver.
    pub(crate) fn channel_handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(Arc::new(ChannelSink::new(tx))), rx)
    }

    /// Builds a handle whose deliveries each take `delay` to complete.
    pub(crate) fn slow_handle(
        delay: std::time::Duration,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(Arc::new(SlowSink { tx, delay })), rx)
    }

    /// Builds a handle that fails every delivery.
    pub(crate) fn failing_handle() -> ConnectionHandle {
        ConnectionHandle::new(Arc::new(FailingSink))
    }
}
