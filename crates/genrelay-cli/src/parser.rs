//! Command-line and environment configuration.
//!
//! Every flag can also be supplied through a `GENRELAY_*` environment
//! variable (or a `.env` file loaded before parsing).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use genrelay_core::{
    DEFAULT_BACKEND_URL, DEFAULT_INTERACTION_LOG_PATH, DEFAULT_LISTEN_PORT, DEFAULT_MODEL,
    RelayConfig,
};

/// HTTP ingress that relays prompts to a local LLM backend.
#[derive(Debug, Parser)]
#[command(name = "genrelay")]
#[command(about = "Relay prompts to an Ollama-compatible backend over HTTP")]
#[command(version)]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "GENRELAY_PORT", default_value_t = DEFAULT_LISTEN_PORT)]
    pub port: u16,

    /// Base URL of the generation backend
    #[arg(long = "llm-url", env = "GENRELAY_LLM_URL", default_value = DEFAULT_BACKEND_URL)]
    pub llm_url: String,

    /// Model identifier sent with every request
    #[arg(long = "llm-model", env = "GENRELAY_LLM_MODEL", default_value = DEFAULT_MODEL)]
    pub llm_model: String,

    /// Timeout for one backend call, in seconds
    #[arg(long, env = "GENRELAY_UPSTREAM_TIMEOUT_SECS", default_value_t = 30)]
    pub upstream_timeout_secs: u64,

    /// How long to let open connections drain on shutdown, in seconds
    #[arg(long, env = "GENRELAY_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    pub drain_timeout_secs: u64,

    /// Path of the JSONL interaction log
    #[arg(long = "interaction-log", env = "GENRELAY_INTERACTION_LOG", default_value = DEFAULT_INTERACTION_LOG_PATH)]
    pub interaction_log: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Cli {
    /// Convert parsed arguments into the process configuration.
    #[must_use]
    pub fn into_config(self) -> RelayConfig {
        RelayConfig {
            listen_port: self.port,
            backend_url: self.llm_url,
            model: self.llm_model,
            upstream_timeout: Duration::from_secs(self.upstream_timeout_secs),
            drain_window: Duration::from_secs(self.drain_timeout_secs),
            interaction_log_path: self.interaction_log,
        }
    }
}
