//! Graceful shutdown orchestration.
//!
//! The orchestrator runs the listener and a background signal wait side by
//! side. A termination signal moves the state to [`ShutdownState::Draining`],
//! stops the listener from accepting new connections, and gives accepted
//! connections the drain window to finish. Relay tasks registered on the
//! shared [`TaskTracker`] are then awaited without a further bound, after
//! which the state becomes [`ShutdownState::Stopped`].

use std::fmt;
use std::future::{Future, IntoFuture};
use std::io;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

/// Lifecycle of the serving process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Errors reported by [`ShutdownOrchestrator::serve`].
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("server error: {0}")]
    Serve(#[from] io::Error),

    #[error("listener did not drain within {0:?}")]
    DrainTimeout(Duration),
}

/// Owns the shutdown state and the tracker relay tasks register on.
#[derive(Debug)]
pub struct ShutdownOrchestrator {
    state: watch::Sender<ShutdownState>,
    tasks: TaskTracker,
    drain_window: Duration,
}

impl ShutdownOrchestrator {
    #[must_use]
    pub fn new(drain_window: Duration) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            state,
            tasks: TaskTracker::new(),
            drain_window,
        }
    }

    /// Tracker that relay tasks must be spawned on to be awaited at shutdown.
    #[must_use]
    pub fn tasks(&self) -> TaskTracker {
        self.tasks.clone()
    }

    #[must_use]
    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Serve `router` on `listener` until `signal` resolves, then drain.
    ///
    /// `signal` resolves to the name of the signal that was received. It is
    /// awaited on its own task. Returns once every tracked task has finished,
    /// or with [`ShutdownError::DrainTimeout`] if accepted connections outlive
    /// the drain window.
    pub async fn serve<F>(
        &self,
        listener: TcpListener,
        router: Router,
        signal: F,
    ) -> Result<(), ShutdownError>
    where
        F: Future<Output = &'static str> + Send + 'static,
    {
        let (signal_tx, signal_rx) = oneshot::channel();
        let signal_task = tokio::spawn(async move {
            let name = signal.await;
            let _ = signal_tx.send(name);
        });

        let drain = CancellationToken::new();
        let mut server = std::pin::pin!(
            axum::serve(listener, router)
                .with_graceful_shutdown(drain.clone().cancelled_owned())
                .into_future()
        );

        let signal_name = tokio::select! {
            result = &mut server => {
                signal_task.abort();
                result?;
                None
            }
            name = signal_rx => Some(name.unwrap_or("unknown")),
        };

        if let Some(signal) = signal_name {
            info!(signal, "shutting down server");
            self.state.send_replace(ShutdownState::Draining);
            drain.cancel();

            match tokio::time::timeout(self.drain_window, &mut server).await {
                Ok(result) => result?,
                Err(_) => {
                    error!(window = ?self.drain_window, "listener did not drain in time");
                    return Err(ShutdownError::DrainTimeout(self.drain_window));
                }
            }
        } else {
            info!("listener stopped without a termination signal");
            self.state.send_replace(ShutdownState::Draining);
        }

        info!(pending = self.tasks.len(), "completing background tasks");
        self.tasks.close();
        self.tasks.wait().await;

        self.state.send_replace(ShutdownState::Stopped);
        info!("stopped server");
        Ok(())
    }
}

/// Resolve when the process receives SIGINT or, on Unix, SIGTERM.
///
/// Returns the signal name. A handler that cannot be installed is logged and
/// never fires.
pub async fn termination_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "SIGINT",
        () = terminate => "SIGTERM",
    }
}
