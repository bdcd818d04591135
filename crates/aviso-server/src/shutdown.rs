//! Graceful shutdown: one token for the listener and every session, plus a
//! tracker for the upgraded sessions axum no longer owns.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// Drain budget when the caller does not pass one.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Signals the listener and every open session to stop, then waits for the
/// sessions' close paths.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not fired yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token handed to the listener and to each session.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fire the shutdown signal. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wrap a WebSocket session so shutdown can wait for it.
    ///
    /// Upgraded connections are detached from the HTTP server, so its own
    /// graceful shutdown does not cover them.
    pub fn track_session<F: Future>(&self, session: F) -> TrackedFuture<F> {
        self.sessions.track_future(session)
    }

    /// Sessions that have not finished yet.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Fire the signal, then wait up to `timeout` for the server task and
    /// every tracked session.
    ///
    /// Returns `false` when the budget ran out first.
    pub async fn graceful_shutdown(
        &self,
        server: JoinHandle<()>,
        timeout: Option<Duration>,
    ) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();
        let _ = self.sessions.close();
        info!(
            open_sessions = self.sessions.len(),
            timeout_secs = timeout.as_secs(),
            "draining server and sessions"
        );

        let drain = async {
            let _ = server.await;
            self.sessions.wait().await;
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                ?timeout,
                open_sessions = self.sessions.len(),
                "shutdown timed out, abandoning remaining sessions"
            );
            return false;
        }
        info!("all sessions closed");
        true
    }
}
