//! Service layer: stream lifecycle and frame fan-out.
//!
//! [`StreamController`] owns the start/stop state and the single background
//! broadcast task; [`broadcast`] holds the fan-out step that task runs.

pub mod broadcast;
pub mod stream_controller;

pub use broadcast::{BroadcastReport, broadcast};
pub use stream_controller::StreamController;
