//! End-to-end shutdown behaviour over a real listener.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use common::{MockBackend, RecordingLog, Script, relay};
use genrelay_proxy::{AppState, ShutdownOrchestrator, ShutdownState, create_router};

#[tokio::test]
async fn in_flight_stream_completes_and_is_logged_after_signal() {
    let tokens = ["one", " two", " three", " four", " five"];
    let backend = MockBackend::start(Script::tokens(&tokens, Duration::from_millis(100))).await;
    let log = Arc::new(RecordingLog::default());

    let orchestrator = Arc::new(ShutdownOrchestrator::new(Duration::from_secs(10)));
    let mut states = orchestrator.subscribe();
    let router = create_router(AppState {
        relay: relay(&backend.base_url, log.clone(), orchestrator.tasks()),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (trigger, fired) = oneshot::channel::<()>();

    let serving = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .serve(listener, router, async move {
                    let _ = fired.await;
                    "TEST"
                })
                .await
        })
    };

    let client = reqwest::Client::new();
    let mut response = client
        .post(format!("http://{addr}/generate-stream"))
        .body(r#"{"prompt":"count to five"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let first = response.chunk().await.unwrap().unwrap();
    assert_eq!(&first[..], b"one");

    // Signal while the stream is still running.
    trigger.send(()).unwrap();
    states
        .wait_for(|s| *s == ShutdownState::Draining)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(TcpStream::connect(addr).await.is_err());

    let mut text = String::from_utf8(first.to_vec()).unwrap();
    while let Some(chunk) = response.chunk().await.unwrap() {
        text.push_str(std::str::from_utf8(&chunk).unwrap());
    }
    assert_eq!(text, "one two three four five");

    serving.await.unwrap().unwrap();
    assert_eq!(orchestrator.state(), ShutdownState::Stopped);

    let records = log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].prompt, "count to five");
    assert_eq!(records[0].response, "one two three four five");
}

#[tokio::test]
async fn idle_server_stops_promptly() {
    let backend = MockBackend::start(Script::tokens(&["x"], Duration::ZERO)).await;
    let log = Arc::new(RecordingLog::default());
    let orchestrator = ShutdownOrchestrator::new(Duration::from_secs(10));
    let router = create_router(AppState {
        relay: relay(&backend.base_url, log.clone(), orchestrator.tasks()),
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.serve(listener, router, async { "TEST" }),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(orchestrator.state(), ShutdownState::Stopped);
    assert!(log.records().is_empty());
}
