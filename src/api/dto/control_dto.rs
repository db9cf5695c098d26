//! Streaming control and health DTOs.

use serde::Serialize;
use utoipa::ToSchema;

/// Acknowledgement for `POST /control/start` and `POST /control/stop`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ControlResponse {
    /// Human-readable outcome, e.g. `"streaming started"`.
    pub status: String,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"healthy"`.
    pub status: String,
    /// Whether the broadcast loop is running.
    pub streaming: bool,
    /// Number of registered streaming connections.
    pub connections: usize,
    /// Number of uploaded arrays.
    pub arrays_stored: usize,
    /// Server version.
    pub version: String,
    /// RFC 3339 time of the check.
    pub timestamp: String,
}
