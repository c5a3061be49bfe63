//! Process configuration types and validation.
//!
//! `RelayConfig` is supplied once at startup and treated as fixed input by
//! every component. Components receive the pieces they need at construction.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default port for the HTTP listener.
pub const DEFAULT_LISTEN_PORT: u16 = 4000;

/// Default base URL of the generation backend (a local Ollama instance).
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:11434";

/// Default model identifier sent with every upstream call.
pub const DEFAULT_MODEL: &str = "llama3.2:1b";

/// Default bound on a single upstream call, including body streaming.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Default window for the listener to drain after a termination signal.
pub const DEFAULT_DRAIN_WINDOW: Duration = Duration::from_secs(30);

/// Default location of the JSONL interaction log.
pub const DEFAULT_INTERACTION_LOG_PATH: &str = "logs/log.jsonl";

/// Fixed process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Port for the HTTP listener.
    pub listen_port: u16,
    /// Backend base URL; `/api/generate` is appended.
    pub backend_url: String,
    /// Model identifier forwarded upstream.
    pub model: String,
    /// Per-call upstream timeout.
    pub upstream_timeout: Duration,
    /// Listener drain window on shutdown.
    pub drain_window: Duration,
    /// Path of the JSONL interaction log.
    pub interaction_log_path: PathBuf,
}

impl RelayConfig {
    /// Create config with the documented defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            listen_port: DEFAULT_LISTEN_PORT,
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            drain_window: DEFAULT_DRAIN_WINDOW,
            interaction_log_path: PathBuf::from(DEFAULT_INTERACTION_LOG_PATH),
        }
    }

    /// Full URL of the upstream generate endpoint.
    #[must_use]
    pub fn generate_endpoint(&self) -> String {
        format!("{}/api/generate", self.backend_url.trim_end_matches('/'))
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("Invalid backend URL '{url}': {reason}")]
    InvalidBackendUrl { url: String, reason: String },

    #[error("Model identifier cannot be empty")]
    EmptyModel,

    #[error("Upstream timeout must be greater than zero")]
    ZeroUpstreamTimeout,

    #[error("Drain window must be greater than zero")]
    ZeroDrainWindow,
}

/// Validate a configuration before any component is built from it.
pub fn validate_config(config: &RelayConfig) -> Result<(), SettingsError> {
    let parsed =
        url::Url::parse(&config.backend_url).map_err(|e| SettingsError::InvalidBackendUrl {
            url: config.backend_url.clone(),
            reason: e.to_string(),
        })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(SettingsError::InvalidBackendUrl {
            url: config.backend_url.clone(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    if config.model.trim().is_empty() {
        return Err(SettingsError::EmptyModel);
    }

    if config.upstream_timeout.is_zero() {
        return Err(SettingsError::ZeroUpstreamTimeout);
    }

    if config.drain_window.is_zero() {
        return Err(SettingsError::ZeroDrainWindow);
    }

    Ok(())
}
