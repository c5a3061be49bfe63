//! Route table and process composition root.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::post;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use genrelay_core::ports::InteractionLogError;
use genrelay_core::{RelayConfig, SettingsError, validate_config};

use crate::handlers;
use crate::interaction_log::JsonlInteractionLog;
use crate::relay::RelayEngine;
use crate::shutdown::{ShutdownOrchestrator, termination_signal};
use crate::upstream::OllamaClient;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub relay: RelayEngine,
}

/// Startup failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] SettingsError),

    #[error("failed to open interaction log {}: {source}", path.display())]
    InteractionLog {
        path: PathBuf,
        source: InteractionLogError,
    },

    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
}

/// Build the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(handlers::generate))
        .route("/generate-stream", post(handlers::generate_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the relay until a termination signal has been handled.
pub async fn start_server(config: RelayConfig) -> anyhow::Result<()> {
    validate_config(&config).map_err(ServerError::from)?;

    let interactions = JsonlInteractionLog::open(&config.interaction_log_path)
        .await
        .map_err(|source| ServerError::InteractionLog {
            path: config.interaction_log_path.clone(),
            source,
        })?;
    let backend = OllamaClient::from_config(&config).map_err(ServerError::from)?;

    let orchestrator = ShutdownOrchestrator::new(config.drain_window);
    let relay = RelayEngine::new(
        Arc::new(backend),
        Arc::new(interactions),
        config.model.clone(),
        orchestrator.tasks(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    info!(
        addr = %listener.local_addr()?,
        backend = %config.generate_endpoint(),
        model = %config.model,
        "starting server"
    );

    orchestrator
        .serve(
            listener,
            create_router(AppState { relay }),
            termination_signal(),
        )
        .await?;

    Ok(())
}
