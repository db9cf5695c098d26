//! Streaming control over HTTP.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::ControlResponse;
use crate::app_state::AppState;

/// `POST /control/start` — Start broadcasting frames.
#[utoipa::path(
    post,
    path = "/control/start",
    tag = "Control",
    summary = "Start streaming",
    description = "Starts the broadcast loop. Starting an active stream is a no-op.",
    responses(
        (status = 200, description = "Streaming is active", body = ControlResponse),
    )
)]
pub async fn start_streaming(State(state): State<AppState>) -> impl IntoResponse {
    state.stream.start().await;
    Json(ControlResponse {
        status: "streaming started".to_string(),
    })
}

/// `POST /control/stop` — Stop broadcasting frames.
#[utoipa::path(
    post,
    path = "/control/stop",
    tag = "Control",
    summary = "Stop streaming",
    description = "Stops the broadcast loop and waits for it to exit. Stopping an idle stream is a no-op.",
    responses(
        (status = 200, description = "Streaming is idle", body = ControlResponse),
    )
)]
pub async fn stop_streaming(State(state): State<AppState>) -> impl IntoResponse {
    state.stream.stop().await;
    Json(ControlResponse {
        status: "streaming stopped".to_string(),
    })
}

/// Control routes mounted under `/control`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/control/start", post(start_streaming))
        .route("/control/stop", post(stop_streaming))
}
