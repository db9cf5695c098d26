//! Domain layer: connection identity, registry, signal source, array store.
//!
//! This module contains the server-side model: connection handles and the
//! registry that tracks live broadcast connections, the synthetic frame
//! generator, and the append-only store of uploaded arrays.

pub mod array_store;
pub mod connection;
pub mod connection_id;
pub mod connection_registry;
pub mod signal;

pub use array_store::{ArrayMetadata, ArrayStore};
pub use connection::{ConnectionHandle, DeliveryError, MessageSink};
pub use connection_id::ConnectionId;
pub use connection_registry::ConnectionRegistry;
pub use signal::{Frame, FrameGenerator, GeneratorConfig};
