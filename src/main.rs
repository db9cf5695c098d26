//! signal-relay server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use tracing_subscriber::EnvFilter;

use signal_relay::api;
use signal_relay::app_state::AppState;
use signal_relay::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = ServerConfig::from_env()?;
    tracing::info!(
        addr = %config.listen_addr,
        sample_rate = config.generator.sample_rate,
        points_per_frame = config.generator.points_per_frame,
        noise_level = config.generator.noise_level,
        "starting signal-relay"
    );

    // Build application state and router
    let state = AppState::new(config.generator)?;
    let app = api::build_app(state.clone(), config.max_upload_bytes);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.stream.stop().await;
    tracing::info!("server stopped");

    Ok(())
}

/// Resolves when the process receives Ctrl-C.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
