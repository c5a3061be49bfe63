//! Strict JSON envelope codec.
//!
//! Request bodies are decoded into exactly one value of a fully-known shape.
//! Unknown fields, wrong JSON types, oversized bodies, and anything trailing
//! the first value are rejected with a distinct [`DecodeError`] variant so the
//! HTTP layer can report a precise cause.
//!
//! Response envelopes are a mapping of named values serialized as a single
//! JSON object followed by a newline.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::error::Category;
use thiserror::Error;
use tracing::debug;

/// Maximum accepted request body size in bytes.
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// A response payload: named values serialized as one JSON object.
pub type Envelope = BTreeMap<String, serde_json::Value>;

/// Reasons a request body can fail strict decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The body exceeded the configured size bound.
    #[error("body must not be larger than {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The body was empty (or whitespace only).
    #[error("body must not be empty")]
    EmptyBody,

    /// The body is not well-formed JSON.
    #[error("body contains badly-formed JSON{}", at_character(.offset))]
    MalformedSyntax { offset: Option<usize> },

    /// A value has the wrong JSON type for the expected shape.
    #[error("body contains incorrect JSON type{} (expected {expected})", at_character(.offset))]
    TypeMismatch {
        expected: String,
        offset: Option<usize>,
    },

    /// The body contains a field that is not part of the expected shape.
    #[error("body contains unknown key \"{field}\"")]
    UnknownField { field: String },

    /// Something other than whitespace follows the first JSON value.
    #[error("body must contain a single JSON value")]
    MultipleValues,

    /// Any decoder failure not covered above.
    #[error("unaccounted-for decode error: {0}")]
    UnrecognizedDecodeError(String),
}

/// Failure to serialize a response envelope. Always a server-side fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error marshaling JSON: {0}")]
pub struct EncodeError(pub String);

fn at_character(offset: &Option<usize>) -> String {
    offset.map_or_else(String::new, |o| format!(" at character {o}"))
}

/// Decode `body` strictly into `T`.
///
/// `T` should be declared with `#[serde(deny_unknown_fields)]`; the decoder
/// maps serde's unknown-field error to [`DecodeError::UnknownField`].
///
/// # Panics
///
/// Panics if `limit` is zero. A zero limit is a programming error in the
/// caller, not a condition a client can trigger.
pub fn decode_strict<T: DeserializeOwned>(body: &[u8], limit: usize) -> Result<T, DecodeError> {
    assert!(limit > 0, "decode_strict requires a non-zero body limit");

    if body.len() > limit {
        return Err(DecodeError::BodyTooLarge { limit });
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::EmptyBody);
    }

    // Derived struct impls also accept JSON arrays; envelopes are objects only.
    if let Some(position) = body.iter().position(|b| !b.is_ascii_whitespace())
        && body[position] == b'['
    {
        return Err(DecodeError::TypeMismatch {
            expected: "a JSON object".to_string(),
            offset: Some(position + 1),
        });
    }

    let mut deserializer = serde_json::Deserializer::from_slice(body);
    let value = T::deserialize(&mut deserializer).map_err(|e| classify(&e, body))?;

    // Only whitespace may follow the first value.
    deserializer
        .end()
        .map_err(|_| DecodeError::MultipleValues)?;

    Ok(value)
}

/// Serialize an envelope as one JSON object followed by a trailing newline.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = serde_json::to_vec(envelope).map_err(|e| EncodeError(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn classify(err: &serde_json::Error, body: &[u8]) -> DecodeError {
    let offset = byte_offset(body, err.line(), err.column());
    match err.classify() {
        // Truncated input has no meaningful position.
        Category::Eof => DecodeError::MalformedSyntax { offset: None },
        Category::Syntax => DecodeError::MalformedSyntax { offset },
        Category::Data => classify_data(err, offset),
        Category::Io => DecodeError::UnrecognizedDecodeError(err.to_string()),
    }
}

fn classify_data(err: &serde_json::Error, offset: Option<usize>) -> DecodeError {
    let rendered = err.to_string();
    let message = rendered
        .rsplit_once(" at line ")
        .map_or(rendered.as_str(), |(message, _)| message);

    if let Some(rest) = message.strip_prefix("unknown field `") {
        let field = rest.split('`').next().unwrap_or_default();
        return DecodeError::UnknownField {
            field: field.to_owned(),
        };
    }

    if let Some(rest) = message
        .strip_prefix("invalid type: ")
        .or_else(|| message.strip_prefix("invalid value: "))
    {
        let expected = rest
            .split_once(", expected ")
            .map_or(rest, |(_, expected)| expected);
        return DecodeError::TypeMismatch {
            expected: expected.to_owned(),
            offset,
        };
    }

    debug!(error = %rendered, "Unclassified decode error");
    DecodeError::UnrecognizedDecodeError(message.to_owned())
}

/// Convert serde_json's 1-based line/column into a 1-based byte position.
fn byte_offset(body: &[u8], line: usize, column: usize) -> Option<usize> {
    if line == 0 {
        return None;
    }
    let line_start = if line == 1 {
        0
    } else {
        body.iter()
            .enumerate()
            .filter(|(_, byte)| **byte == b'\n')
            .nth(line - 2)
            .map(|(index, _)| index + 1)?
    };
    Some(line_start + column)
}
