//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the relay core expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No `reqwest` or `axum` types in any signature
//! - No filesystem implementation details
//! - Errors are domain errors, not transport errors

pub mod generation_backend;
pub mod interaction_log;

pub use generation_backend::{GenerationBackendPort, UpstreamByteStream, UpstreamError};
pub use interaction_log::{InteractionLogError, InteractionLogPort};
