//! Shared fixtures for genrelay-proxy integration tests.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;

use genrelay_core::ports::{InteractionLogError, InteractionLogPort};
use genrelay_core::{InteractionRecord, UpstreamCallSpec};
use genrelay_proxy::{AppState, OllamaClient, RelayEngine, create_router};

pub const TEST_MODEL: &str = "test-model";

/// What the mock backend answers with.
#[derive(Debug, Clone)]
pub enum Script {
    /// A single JSON object.
    Buffered(serde_json::Value),
    /// A single JSON object sent after `delay`.
    Delayed {
        value: serde_json::Value,
        delay: Duration,
    },
    /// NDJSON lines, each sent as its own chunk after `delay`.
    Stream { lines: Vec<String>, delay: Duration },
    /// A bare error status.
    Status(u16),
}

impl Script {
    /// Stream of `{"response": token}` lines followed by a done marker.
    pub fn tokens(tokens: &[&str], delay: Duration) -> Self {
        let mut lines: Vec<String> = tokens
            .iter()
            .map(|t| format!("{}\n", serde_json::json!({ "model": TEST_MODEL, "response": t, "done": false })))
            .collect();
        lines.push("{\"response\":\"\",\"done\":true}\n".to_string());
        Self::Stream { lines, delay }
    }
}

#[derive(Clone)]
struct BackendState {
    script: Script,
    calls: Arc<Mutex<Vec<UpstreamCallSpec>>>,
}

/// An Ollama-compatible backend on an ephemeral port.
pub struct MockBackend {
    pub base_url: String,
    calls: Arc<Mutex<Vec<UpstreamCallSpec>>>,
}

impl MockBackend {
    pub async fn start(script: Script) -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = BackendState {
            script,
            calls: Arc::clone(&calls),
        };
        let app = Router::new()
            .route("/api/generate", post(mock_generate))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            calls,
        }
    }

    /// Specs received so far, in arrival order.
    pub fn calls(&self) -> Vec<UpstreamCallSpec> {
        self.calls.lock().unwrap().clone()
    }
}

async fn mock_generate(
    State(state): State<BackendState>,
    axum::Json(spec): axum::Json<UpstreamCallSpec>,
) -> Response {
    state.calls.lock().unwrap().push(spec);
    match state.script {
        Script::Buffered(value) => axum::Json(value).into_response(),
        Script::Delayed { value, delay } => {
            tokio::time::sleep(delay).await;
            axum::Json(value).into_response()
        }
        Script::Status(code) => StatusCode::from_u16(code).unwrap().into_response(),
        Script::Stream { lines, delay } => {
            let chunks = futures_util::stream::iter(lines).then(move |line| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, io::Error>(Bytes::from(line))
            });
            Response::new(Body::from_stream(chunks))
        }
    }
}

/// A base URL nothing is listening on.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Interaction log that keeps records in memory.
#[derive(Debug, Default)]
pub struct RecordingLog {
    records: Mutex<Vec<InteractionRecord>>,
}

impl RecordingLog {
    pub fn records(&self) -> Vec<InteractionRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl InteractionLogPort for RecordingLog {
    async fn append(&self, record: InteractionRecord) -> Result<(), InteractionLogError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// Relay engine pointed at `base_url` with a recording log.
pub fn relay(base_url: &str, log: Arc<RecordingLog>, tasks: TaskTracker) -> RelayEngine {
    let backend = OllamaClient::new(
        format!("{base_url}/api/generate"),
        Duration::from_secs(5),
    )
    .unwrap();
    RelayEngine::new(Arc::new(backend), log, TEST_MODEL, tasks)
}

/// Router plus the tracker its background tasks run on.
pub fn app(base_url: &str, log: Arc<RecordingLog>) -> (Router, TaskTracker) {
    let tasks = TaskTracker::new();
    let relay = relay(base_url, log, tasks.clone());
    (create_router(AppState { relay }), tasks)
}

pub fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

/// Wait for every background task on `tasks`.
pub async fn settle(tasks: &TaskTracker) {
    tasks.close();
    tasks.wait().await;
}
