//! Core domain types, envelope codec, and ports for the genrelay ingress.
//!
//! This crate has no HTTP server or HTTP client. Adapters live in
//! `genrelay-proxy`.
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod envelope;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    GenerationRequest, InteractionRecord, RelayOutcome, UpstreamCallSpec, UpstreamEvent,
    ValidationError,
};
pub use envelope::{
    DecodeError, EncodeError, Envelope, MAX_BODY_BYTES, decode_strict, encode_envelope,
};
pub use ports::{
    GenerationBackendPort, InteractionLogError, InteractionLogPort, UpstreamByteStream,
    UpstreamError,
};
pub use settings::{
    DEFAULT_BACKEND_URL, DEFAULT_DRAIN_WINDOW, DEFAULT_INTERACTION_LOG_PATH, DEFAULT_LISTEN_PORT,
    DEFAULT_MODEL, DEFAULT_UPSTREAM_TIMEOUT, RelayConfig, SettingsError, validate_config,
};
