//! Request-scoped domain types.
//!
//! Every value here is owned by the task handling a single request and is
//! immutable once built.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Inbound generation request envelope: `{"prompt": "..."}`.
///
/// A missing `prompt` decodes as an empty string and is then rejected by
/// [`GenerationRequest::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationRequest {
    #[serde(default)]
    pub prompt: String,
}

/// Semantic validation failures for a decoded request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("prompt cannot be empty")]
    EmptyPrompt,
}

impl GenerationRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        Ok(())
    }

    /// Validate and hand back the prompt, untrimmed.
    pub fn into_prompt(self) -> Result<String, ValidationError> {
        self.validate()?;
        Ok(self.prompt)
    }
}

/// Body of one call to the upstream `/api/generate` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamCallSpec {
    pub prompt: String,
    pub model: String,
    pub stream: bool,
}

impl UpstreamCallSpec {
    /// Call body for a single buffered response.
    #[must_use]
    pub fn buffered(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            stream: false,
        }
    }

    /// Call body for a newline-delimited token stream.
    #[must_use]
    pub fn streaming(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            stream: true,
        }
    }
}

/// One decoded line of the upstream event stream.
///
/// Only [`UpstreamEvent::Token`] carries anything the relay forwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// A JSON object with a non-empty string `response` field.
    Token(String),
    /// A JSON object whose `response` field is missing, empty, or not a string.
    NoToken,
    /// Not a JSON object at all.
    Malformed(String),
}

impl UpstreamEvent {
    /// Decode a single line (without its trailing newline).
    pub fn parse(line: &[u8]) -> Self {
        match serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(line) {
            Ok(mut object) => match object.remove("response") {
                Some(serde_json::Value::String(token)) if !token.is_empty() => Self::Token(token),
                _ => Self::NoToken,
            },
            Err(e) => Self::Malformed(e.to_string()),
        }
    }
}

/// Accumulated result of one accepted request, paired with its prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub prompt: String,
    pub text: String,
}

impl RelayOutcome {
    #[must_use]
    pub const fn new(prompt: String, text: String) -> Self {
        Self { prompt, text }
    }

    /// Stamp the outcome with the current time for the interaction log.
    #[must_use]
    pub fn into_record(self) -> InteractionRecord {
        InteractionRecord::now(self.prompt, self.text)
    }
}

/// One line of the interaction log: `{timestamp, prompt, response}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// RFC 3339 timestamp.
    pub timestamp: String,
    pub prompt: String,
    pub response: String,
}

impl InteractionRecord {
    #[must_use]
    pub fn now(prompt: String, response: String) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            prompt,
            response,
        }
    }
}
