//! Upstream client for the generation backend.
//!
//! Speaks the Ollama `/api/generate` protocol: the request body is the
//! serialized [`UpstreamCallSpec`]; a buffered response is one JSON object
//! and a streaming response is newline-delimited JSON.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::Client;
use tracing::{debug, error};

use genrelay_core::ports::{GenerationBackendPort, UpstreamByteStream, UpstreamError};
use genrelay_core::{RelayConfig, UpstreamCallSpec};

/// reqwest-backed client for a single Ollama-compatible backend.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    endpoint: String,
}

impl OllamaClient {
    /// Build a client for `endpoint` (the full `/api/generate` URL).
    ///
    /// `timeout` bounds the whole call, body streaming included.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Build a client from process configuration.
    pub fn from_config(config: &RelayConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.generate_endpoint(), config.upstream_timeout)
    }

    /// POST the call body and reject non-2xx responses.
    async fn post(&self, spec: &UpstreamCallSpec) -> Result<reqwest::Response, UpstreamError> {
        debug!(
            endpoint = %self.endpoint,
            model = %spec.model,
            stream = spec.stream,
            "Calling generation backend"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(spec)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach generation backend: {e}");
                UpstreamError::Unreachable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "Generation backend returned an error status");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl GenerationBackendPort for OllamaClient {
    async fn generate(
        &self,
        spec: &UpstreamCallSpec,
    ) -> Result<serde_json::Map<String, serde_json::Value>, UpstreamError> {
        let response = self.post(spec).await?;
        response
            .json::<serde_json::Map<String, serde_json::Value>>()
            .await
            .map_err(|e| {
                // A body read that times out is still a transport failure.
                if e.is_timeout() {
                    UpstreamError::Unreachable(e.to_string())
                } else {
                    UpstreamError::InvalidBody(e.to_string())
                }
            })
    }

    async fn open_stream(
        &self,
        spec: &UpstreamCallSpec,
    ) -> Result<UpstreamByteStream, UpstreamError> {
        let response = self.post(spec).await?;
        let stream = response
            .bytes_stream()
            .map_err(|e| UpstreamError::Interrupted(e.to_string()));
        Ok(Box::pin(stream))
    }
}
