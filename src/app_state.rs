//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::{ArrayStore, ConnectionRegistry, FrameGenerator, GeneratorConfig};
use crate::error::ServerError;
use crate::service::StreamController;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
///
/// Built explicitly at startup; nothing here is a process-wide global, so
/// tests can construct independent instances.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Uploaded arrays.
    pub store: Arc<ArrayStore>,
    /// Live streaming connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Broadcast start/stop control.
    pub stream: Arc<StreamController>,
}

impl AppState {
    /// Builds a fresh state with an empty store and registry.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidConfig`] if the generator settings are
    /// invalid.
    pub fn new(generator: GeneratorConfig) -> Result<Self, ServerError> {
        let registry = Arc::new(ConnectionRegistry::new());
        let stream = Arc::new(StreamController::new(
            Arc::clone(&registry),
            FrameGenerator::new(generator)?,
        ));
        Ok(Self {
            store: Arc::new(ArrayStore::new()),
            registry,
            stream,
        })
    }

    /// Stops streaming and returns every component to its initial state.
    pub async fn reset(&self) {
        self.stream.stop().await;
        self.registry.clear().await;
        self.store.clear().await;
        self.stream.reset_clock();
        tracing::debug!("application state reset");
    }
}
