//! Route handlers for `/generate` and `/generate-stream`.

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use tracing::{debug, error};

use genrelay_core::GenerationRequest;

use crate::envelope::{StrictJson, single, write_envelope};
use crate::error::HttpError;
use crate::relay::{ChannelSink, STUB_RESPONSE};
use crate::server::AppState;

/// POST /generate - buffered generation.
///
/// The relay runs as a tracked task, so a client that disconnects mid-call
/// does not cancel it. Upstream failures answer 500 with the stub body and
/// are not logged to the interaction log.
pub async fn generate(
    State(state): State<AppState>,
    StrictJson(request): StrictJson<GenerationRequest>,
) -> Result<Response, HttpError> {
    let prompt = request.into_prompt()?;
    debug!(prompt_len = prompt.len(), "POST /generate");

    match state.relay.spawn_once(prompt).await {
        Ok(text) => Ok(write_envelope(StatusCode::OK, &single("response", text), None)?),
        Err(e) => {
            error!(error = %e, "error calling generation backend");
            Ok(write_envelope(
                StatusCode::INTERNAL_SERVER_ERROR,
                &single("response", STUB_RESPONSE),
                None,
            )?)
        }
    }
}

/// POST /generate-stream - token streaming.
///
/// The status line is committed before the backend is called, so backend
/// failures show up as fallback text inside the 200 stream.
pub async fn generate_stream(
    State(state): State<AppState>,
    StrictJson(request): StrictJson<GenerationRequest>,
) -> Result<Response, HttpError> {
    let prompt = request.into_prompt()?;
    debug!(prompt_len = prompt.len(), "POST /generate-stream");

    let (sink, body) = ChannelSink::pair();
    state.relay.spawn_stream(prompt, sink);

    let mut response = Response::new(Body::from_stream(body));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

    Ok(response)
}
