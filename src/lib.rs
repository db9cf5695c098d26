//! # signal-relay
//!
//! HTTP array exchange and WebSocket signal broadcast server.
//!
//! Clients upload NumPy `.npy` files over HTTP and read them back by index.
//! Over a persistent WebSocket at `/ws/stream` they start and stop a shared
//! broadcast of synthetic sine-wave frames that is pushed to every connected
//! client.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Session (ws/)
//!     │
//!     ├── StreamController + broadcast loop (service/)
//!     │
//!     ├── ConnectionRegistry, FrameGenerator, ArrayStore (domain/)
//!     └── .npy codec (codec/)
//! ```

pub mod api;
pub mod app_state;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;
