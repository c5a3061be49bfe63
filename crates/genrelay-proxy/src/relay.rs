//! Relay engine: buffered and token-streaming delivery.
//!
//! The streaming path reads newline-delimited JSON events from the backend,
//! forwards every non-empty `response` token to the client as soon as it is
//! decoded, and accumulates the full text for the interaction log. Malformed
//! event lines are skipped. Whatever happens after the backend accepts the
//! call, exactly one interaction record is written per request.
//!
//! Per-request state machine:
//!
//! ```text
//! Idle ──open ok──▶ Connected ──▶ (Skipping | Emitting)* ──▶ Closed
//!   │
//!   └──open failed──▶ FallbackSent
//! ```

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use genrelay_core::ports::{
    GenerationBackendPort, InteractionLogPort, UpstreamByteStream, UpstreamError,
};
use genrelay_core::{RelayOutcome, UpstreamCallSpec, UpstreamEvent};

/// Body returned by the buffered endpoint when the backend call fails.
pub const STUB_RESPONSE: &str = "stubbed error message";

/// Text written into the token stream when the backend cannot be reached.
pub const FALLBACK_TEXT: &str = "Error connecting to LLM. Here's a stubbed response to your prompt.";

/// Longest upstream event line accepted before the stream is abandoned.
pub const MAX_EVENT_LINE_BYTES: usize = 64 * 1024;

/// Errors from buffered generation.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("upstream response does not contain a string \"response\" field")]
    MissingResponseField,

    #[error("relay task failed: {0}")]
    TaskFailed(String),
}

/// The client side of a streaming response went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("client disconnected")]
pub struct ClientGone;

/// Destination for streamed tokens.
#[async_trait]
pub trait TokenSink: Send {
    /// Deliver one chunk to the client.
    ///
    /// Returns once the sink has accepted the chunk. A sink may hold a
    /// bounded number of undelivered chunks; [`ChannelSink`] holds at most
    /// one, so the caller is never more than one token ahead of the client.
    async fn send(&mut self, chunk: &str) -> Result<(), ClientGone>;
}

/// Body stream type produced by [`ChannelSink::pair`].
pub type TokenBodyStream = ReceiverStream<Result<Bytes, io::Error>>;

/// Token sink backed by a single-slot channel feeding an HTTP body.
///
/// Each token becomes its own body frame. With one slot, the relay can never
/// get more than one token ahead of the connection.
#[derive(Debug)]
pub struct ChannelSink {
    sender: mpsc::Sender<Result<Bytes, io::Error>>,
}

impl ChannelSink {
    /// Create a sink and the body stream it feeds.
    #[must_use]
    pub fn pair() -> (Self, TokenBodyStream) {
        let (sender, receiver) = mpsc::channel(1);
        (Self { sender }, ReceiverStream::new(receiver))
    }
}

#[async_trait]
impl TokenSink for ChannelSink {
    async fn send(&mut self, chunk: &str) -> Result<(), ClientGone> {
        self.sender
            .send(Ok(Bytes::copy_from_slice(chunk.as_bytes())))
            .await
            .map_err(|_| ClientGone)
    }
}

/// How a streaming relay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTermination {
    /// The upstream stream reached EOF.
    Exhausted,
    /// The upstream stream failed or produced an oversized line.
    ScanFailed,
    /// Writing to the client failed.
    ClientGone,
    /// The backend call failed and the fallback text was delivered.
    FallbackSent,
}

/// Summary of one streaming relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReport {
    pub termination: StreamTermination,
    /// Tokens delivered to the client.
    pub tokens: usize,
    /// Upstream lines that failed to decode.
    pub skipped_lines: usize,
    /// The outcome handed to the interaction log, if any.
    pub outcome: Option<RelayOutcome>,
}

/// Errors from splitting the upstream byte stream into lines.
#[derive(Debug, Error)]
enum ScanError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("upstream event line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

/// Splits an upstream byte stream into newline-delimited lines.
struct NdjsonLines {
    stream: UpstreamByteStream,
    buf: BytesMut,
    eof: bool,
}

impl NdjsonLines {
    fn new(stream: UpstreamByteStream) -> Self {
        Self {
            stream,
            buf: BytesMut::new(),
            eof: false,
        }
    }

    /// Next non-blank line without its line ending; `None` at EOF.
    async fn next_line(&mut self) -> Result<Option<Bytes>, ScanError> {
        loop {
            if let Some(line_end) = find_newline(&self.buf) {
                let line = trim_line_ending(self.buf.split_to(line_end).freeze());
                if line.len() > MAX_EVENT_LINE_BYTES {
                    return Err(ScanError::LineTooLong {
                        limit: MAX_EVENT_LINE_BYTES,
                    });
                }
                if is_blank(&line) {
                    continue;
                }
                return Ok(Some(line));
            }

            if self.buf.len() > MAX_EVENT_LINE_BYTES {
                return Err(ScanError::LineTooLong {
                    limit: MAX_EVENT_LINE_BYTES,
                });
            }

            if self.eof {
                // A final line may arrive without a trailing newline.
                let rest = trim_line_ending(self.buf.split().freeze());
                return Ok((!is_blank(&rest)).then_some(rest));
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(e.into()),
                None => self.eof = true,
            }
        }
    }
}

/// Find the next newline in the buffer, returning the position after it.
fn find_newline(buf: &BytesMut) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n').map(|pos| pos + 1)
}

fn trim_line_ending(line: Bytes) -> Bytes {
    let mut end = line.len();
    if end > 0 && line[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }
    line.slice(..end)
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

/// Drives upstream calls and hands outcomes to the interaction log.
///
/// Cheap to clone; clones share the backend, the log, and the task tracker.
#[derive(Clone)]
pub struct RelayEngine {
    backend: Arc<dyn GenerationBackendPort>,
    interactions: Arc<dyn InteractionLogPort>,
    model: String,
    tasks: TaskTracker,
}

impl RelayEngine {
    /// Create an engine. Background work is registered on `tasks` so the
    /// shutdown orchestrator can wait for it.
    pub fn new(
        backend: Arc<dyn GenerationBackendPort>,
        interactions: Arc<dyn InteractionLogPort>,
        model: impl Into<String>,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            backend,
            interactions,
            model: model.into(),
            tasks,
        }
    }

    /// Tracker holding this engine's in-flight relay and log tasks.
    #[must_use]
    pub const fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// Buffered generation.
    ///
    /// On success the text is returned and the interaction is logged in the
    /// background. On failure nothing is logged.
    pub async fn generate_once(&self, prompt: &str) -> Result<String, RelayError> {
        let spec = UpstreamCallSpec::buffered(prompt, self.model.as_str());
        let mut body = self.backend.generate(&spec).await?;

        let Some(serde_json::Value::String(text)) = body.remove("response") else {
            return Err(RelayError::MissingResponseField);
        };

        info!(prompt_len = prompt.len(), response_len = text.len(), "Generated response");
        self.record_in_background(RelayOutcome::new(prompt.to_owned(), text.clone()));
        Ok(text)
    }

    /// Run [`Self::generate_once`] as a tracked task and wait for it.
    ///
    /// Dropping the returned future does not cancel the upstream call, so an
    /// accepted request is still logged when its client goes away.
    pub fn spawn_once(
        &self,
        prompt: String,
    ) -> impl Future<Output = Result<String, RelayError>> + Send + 'static {
        let engine = self.clone();
        let handle = self
            .tasks
            .spawn(async move { engine.generate_once(&prompt).await });
        async move {
            handle
                .await
                .map_err(|e| RelayError::TaskFailed(e.to_string()))?
        }
    }

    /// Token-streaming generation into `sink`.
    ///
    /// Never fails: backend failure turns into [`FALLBACK_TEXT`], and every
    /// other ending still logs the text accumulated so far.
    pub async fn generate_stream<S>(&self, prompt: String, sink: &mut S) -> StreamReport
    where
        S: TokenSink + ?Sized,
    {
        let spec = UpstreamCallSpec::streaming(prompt.as_str(), self.model.as_str());
        let stream = match self.backend.open_stream(&spec).await {
            Ok(stream) => stream,
            Err(e) => return self.send_fallback(prompt, sink, &e).await,
        };
        debug!(prompt_len = prompt.len(), "Upstream stream connected");

        let mut lines = NdjsonLines::new(stream);
        let mut accumulated = String::new();
        let mut tokens = 0;
        let mut skipped_lines = 0;

        let termination = loop {
            match lines.next_line().await {
                Ok(Some(line)) => match UpstreamEvent::parse(&line) {
                    UpstreamEvent::Token(token) => {
                        if let Err(e) = sink.send(&token).await {
                            warn!(tokens, "error writing token: {e}");
                            break StreamTermination::ClientGone;
                        }
                        accumulated.push_str(&token);
                        tokens += 1;
                    }
                    UpstreamEvent::NoToken => {}
                    UpstreamEvent::Malformed(reason) => {
                        skipped_lines += 1;
                        warn!(error = %reason, "error parsing upstream event, skipping line");
                    }
                },
                Ok(None) => break StreamTermination::Exhausted,
                Err(e) => {
                    error!(error = %e, "upstream scan error");
                    break StreamTermination::ScanFailed;
                }
            }
        };

        // Release the upstream connection before the log write.
        drop(lines);
        debug!(?termination, tokens, skipped_lines, "Upstream stream closed");

        let outcome = RelayOutcome::new(prompt, accumulated);
        self.record(outcome.clone()).await;

        StreamReport {
            termination,
            tokens,
            skipped_lines,
            outcome: Some(outcome),
        }
    }

    /// Run [`Self::generate_stream`] as a tracked background task.
    pub fn spawn_stream<S>(&self, prompt: String, mut sink: S)
    where
        S: TokenSink + 'static,
    {
        let engine = self.clone();
        self.tasks.spawn(async move {
            let report = engine.generate_stream(prompt, &mut sink).await;
            debug!(
                termination = ?report.termination,
                tokens = report.tokens,
                "Streaming relay finished"
            );
        });
    }

    async fn send_fallback<S>(
        &self,
        prompt: String,
        sink: &mut S,
        cause: &UpstreamError,
    ) -> StreamReport
    where
        S: TokenSink + ?Sized,
    {
        error!(error = %cause, "error calling generation backend, sending fallback");

        if let Err(e) = sink.send(FALLBACK_TEXT).await {
            error!("failed to write fallback: {e}");
            return StreamReport {
                termination: StreamTermination::ClientGone,
                tokens: 0,
                skipped_lines: 0,
                outcome: None,
            };
        }

        let outcome = RelayOutcome::new(prompt, FALLBACK_TEXT.to_string());
        self.record(outcome.clone()).await;

        StreamReport {
            termination: StreamTermination::FallbackSent,
            tokens: 0,
            skipped_lines: 0,
            outcome: Some(outcome),
        }
    }

    async fn record(&self, outcome: RelayOutcome) {
        if let Err(e) = self.interactions.append(outcome.into_record()).await {
            error!(error = %e, "error logging interaction");
        }
    }

    fn record_in_background(&self, outcome: RelayOutcome) {
        let engine = self.clone();
        self.tasks.spawn(async move {
            engine.record(outcome).await;
        });
    }
}

impl fmt::Debug for RelayEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayEngine")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}
