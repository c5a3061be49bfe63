//! Axum glue for the envelope codec: a strict JSON extractor and an
//! envelope response writer.

use axum::body::Body;
use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::de::DeserializeOwned;

use genrelay_core::{DecodeError, EncodeError, Envelope, MAX_BODY_BYTES, decode_strict, encode_envelope};

use crate::error::HttpError;

/// Extractor that decodes the request body with [`decode_strict`].
///
/// Unlike `axum::Json` it ignores the request content type, rejects unknown
/// fields and trailing values, and stops reading at [`MAX_BODY_BYTES`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for StrictJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let limited = Limited::new(req.into_body(), MAX_BODY_BYTES);
        let bytes = match limited.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return Err(DecodeError::BodyTooLarge {
                    limit: MAX_BODY_BYTES,
                }
                .into());
            }
            Err(e) => return Err(HttpError::BadRequest(format!("failed to read body: {e}"))),
        };

        Ok(Self(decode_strict(&bytes, MAX_BODY_BYTES)?))
    }
}

/// Build a JSON envelope response.
///
/// Caller headers are applied first; `Content-Type: application/json` is
/// always set last and wins over any caller value.
pub fn write_envelope(
    status: StatusCode,
    envelope: &Envelope,
    headers: Option<HeaderMap>,
) -> Result<Response, EncodeError> {
    let body = encode_envelope(envelope)?;

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    if let Some(extra) = headers {
        response.headers_mut().extend(extra);
    }
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Ok(response)
}

/// Envelope with a single named value.
pub fn single(key: &str, value: impl Into<serde_json::Value>) -> Envelope {
    Envelope::from([(key.to_string(), value.into())])
}
