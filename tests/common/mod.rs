//! Shared helpers: run the real router on an ephemeral port.

#![allow(dead_code, clippy::panic)]

use std::net::SocketAddr;
use std::time::Duration;

use signal_relay::api::build_app;
use signal_relay::app_state::AppState;
use signal_relay::config::DEFAULT_MAX_UPLOAD_BYTES;
use signal_relay::domain::GeneratorConfig;

/// Fast generator so streaming tests finish quickly.
pub fn fast_generator() -> GeneratorConfig {
    GeneratorConfig {
        sample_rate: 0.01,
        ..GeneratorConfig::default()
    }
}

/// Binds a listener on `127.0.0.1:0` and serves the app in the background.
pub async fn spawn_server(generator: GeneratorConfig) -> (SocketAddr, AppState) {
    let Ok(state) = AppState::new(generator) else {
        panic!("valid app state");
    };
    let app = build_app(state.clone(), DEFAULT_MAX_UPLOAD_BYTES);
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind ephemeral port");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("listener has an address");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, state)
}

const POLL_ATTEMPTS: usize = 200;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Waits up to two seconds for the registry to hold `count` connections.
pub async fn wait_for_connections(state: &AppState, count: usize) -> bool {
    for _ in 0..POLL_ATTEMPTS {
        if state.registry.len().await == count {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    false
}

/// Waits up to two seconds for the stream to become idle.
pub async fn wait_until_idle(state: &AppState) -> bool {
    for _ in 0..POLL_ATTEMPTS {
        if !state.stream.is_active() {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    false
}
