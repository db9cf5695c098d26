//! Server configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;

use crate::domain::GeneratorConfig;
use crate::error::ServerError;

/// Default upload size limit (16 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Top-level server configuration.
///
/// Loaded once at startup via [`ServerConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8000`).
    pub listen_addr: SocketAddr,

    /// Signal generator settings for the broadcast stream.
    pub generator: GeneratorConfig,

    /// Maximum accepted request body size for array uploads.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            generator: GeneratorConfig::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidConfig`] if `LISTEN_ADDR` is set but
    /// cannot be parsed, or if the generator settings are out of range.
    pub fn from_env() -> Result<Self, ServerError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let listen_addr = match std::env::var("LISTEN_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| ServerError::InvalidConfig(format!("LISTEN_ADDR {raw:?}: {e}")))?,
            Err(_) => defaults.listen_addr,
        };

        let generator = GeneratorConfig {
            sample_rate: parse_env("STREAM_SAMPLE_RATE_SECS", defaults.generator.sample_rate),
            points_per_frame: parse_env(
                "STREAM_POINTS_PER_FRAME",
                defaults.generator.points_per_frame,
            ),
            noise_level: parse_env("STREAM_NOISE_LEVEL", defaults.generator.noise_level),
        };
        generator.validate()?;

        let max_upload_bytes = parse_env("MAX_UPLOAD_BYTES", defaults.max_upload_bytes);

        Ok(Self {
            listen_addr,
            generator,
            max_upload_bytes,
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
