//! WebSocket layer: streaming protocol, per-connection session, socket glue.
//!
//! The endpoint at `/ws/stream` accepts `start`/`stop`/`ping` control
//! actions and pushes `data` frames while streaming is active.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod session;
