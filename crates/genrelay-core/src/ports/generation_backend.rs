//! Generation backend port.
//!
//! Abstracts the single upstream text-generation service. The relay engine
//! asks for either one decoded JSON object or a raw byte stream of
//! newline-delimited events; how the call is made is an adapter concern.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use thiserror::Error;

use crate::domain::UpstreamCallSpec;

/// Raw upstream byte stream. Dropping it releases the underlying connection.
pub type UpstreamByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

/// Errors from an upstream call. None of these are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Connection refused, DNS failure, timeout, or another transport fault.
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    /// The backend answered with a non-2xx status.
    #[error("upstream returned non-success status code: {status}")]
    Status { status: u16 },

    /// A buffered response body was not a JSON object.
    #[error("error decoding upstream response: {0}")]
    InvalidBody(String),

    /// The byte stream failed after the call was accepted.
    #[error("upstream stream interrupted: {0}")]
    Interrupted(String),
}

/// Port for calling the generation backend.
#[async_trait]
pub trait GenerationBackendPort: Send + Sync + fmt::Debug {
    /// Issue a buffered call (`spec.stream == false`) and decode the body as
    /// a JSON object.
    async fn generate(
        &self,
        spec: &UpstreamCallSpec,
    ) -> Result<serde_json::Map<String, serde_json::Value>, UpstreamError>;

    /// Issue a streaming call (`spec.stream == true`) and return the body as
    /// a byte stream.
    ///
    /// The caller owns the stream and must drop it when done, on every exit
    /// path.
    async fn open_stream(&self, spec: &UpstreamCallSpec)
    -> Result<UpstreamByteStream, UpstreamError>;
}
