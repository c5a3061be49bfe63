//! HTTP surface for the genrelay ingress.
//!
//! Wires the core ports to concrete adapters:
//!
//! - [`upstream::OllamaClient`] speaks to the generation backend
//! - [`interaction_log::JsonlInteractionLog`] appends interaction records
//! - [`relay::RelayEngine`] runs buffered and streaming generation
//! - [`shutdown::ShutdownOrchestrator`] drains the listener and tracked tasks
//!
//! [`start_server`] is the composition root used by the binary.

pub mod envelope;
pub mod error;
pub mod handlers;
pub mod interaction_log;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod upstream;

pub use envelope::{StrictJson, write_envelope};
pub use error::HttpError;
pub use interaction_log::JsonlInteractionLog;
pub use relay::{
    ChannelSink, ClientGone, FALLBACK_TEXT, MAX_EVENT_LINE_BYTES, RelayEngine, RelayError,
    STUB_RESPONSE, StreamReport, StreamTermination, TokenSink,
};
pub use server::{AppState, ServerError, create_router, start_server};
pub use shutdown::{ShutdownError, ShutdownOrchestrator, ShutdownState, termination_signal};
pub use upstream::OllamaClient;
