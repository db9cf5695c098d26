//! WebSocket message types for the streaming protocol.
//!
//! Inbound messages carry an `action` discriminator; outbound messages carry
//! a `type` discriminator.

use serde::{Deserialize, Serialize};

use crate::domain::Frame;

/// Control actions a client can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    /// Begin broadcasting frames.
    Start,
    /// Stop broadcasting frames.
    Stop,
    /// Keep-alive probe.
    Ping,
    /// Any other `action` value.
    #[serde(other)]
    Unknown,
}

impl ClientAction {
    /// Parses a text message.
    ///
    /// Invalid JSON, a missing `action` field, or a non-string `action` all
    /// map to [`ClientAction::Unknown`].
    #[must_use]
    pub fn parse(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or(Self::Unknown)
    }
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Acknowledges a start/stop request with the resulting state.
    Status {
        /// Whether the stream is running.
        streaming: bool,
    },
    /// Reply to [`ClientAction::Ping`].
    Pong,
    /// One broadcast frame.
    Data(FramePayload),
}

/// Body of a `data` message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FramePayload {
    /// Logical clock value of the frame.
    pub timestamp: f64,
    /// Always `[N]`.
    pub shape: Vec<usize>,
    /// Always `"float64"`.
    pub dtype: &'static str,
    /// Sample positions.
    pub x: Vec<f64>,
    /// Sample values.
    pub y: Vec<f64>,
}

impl From<Frame> for ServerMessage {
    fn from(frame: Frame) -> Self {
        Self::Data(FramePayload {
            shape: frame.shape(),
            timestamp: frame.timestamp,
            dtype: "float64",
            x: frame.x,
            y: frame.y,
        })
    }
}
