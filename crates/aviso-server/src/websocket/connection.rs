//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use aviso_core::{AccountId, ConnectionId};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Handshake phase of a connection.
///
/// `Connected → Registered(account) → Closed`. `Registered` may be re-entered
/// with another account; nothing leaves `Closed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Open, no identity claimed yet.
    Connected,
    /// Bound to an account by the handshake.
    Registered(AccountId),
    /// Close path has run.
    Closed,
}

/// Why a frame could not be handed to the writer task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The outbound queue is at capacity.
    #[error("outbound queue is full")]
    QueueFull,
    /// The writer task is gone or the connection is closed.
    #[error("connection is closed")]
    Closed,
}

impl ConnectionError {
    /// Stable label used for metrics.
    pub fn label(self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::Closed => "closed",
        }
    }
}

/// One connected WebSocket client.
///
/// Outbound frames go through a bounded channel drained by the session's
/// writer task, so [`send`](Self::send) never waits on network I/O.
pub struct ClientConnection {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    phase: Mutex<ConnectionPhase>,
    cancel: CancellationToken,
    /// When this connection was accepted.
    pub connected_at: Instant,
    /// Whether the client showed activity since the last heartbeat check.
    is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection writing into `tx`.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            phase: Mutex::new(ConnectionPhase::Connected),
            cancel: CancellationToken::new(),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Queue a text frame for the client.
    pub fn send(&self, frame: Arc<String>) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        self.tx.try_send(frame).map_err(|e| {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => ConnectionError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => ConnectionError::Closed,
            }
        })
    }

    /// Frames refused because the queue was full or closed.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Whether frames can still be handed to the writer.
    pub fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }

    /// Whether the close path has run or the connection was asked to close.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ask the session to close this connection.
    ///
    /// Only signals; the session's close path does the cleanup.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Resolves once [`close`](Self::close) was called or the close path ran.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Child token cancelled together with this connection.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Current handshake phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.phase.lock().clone()
    }

    /// Account bound by the last successful registration.
    pub fn account(&self) -> Option<AccountId> {
        match &*self.phase.lock() {
            ConnectionPhase::Registered(account) => Some(account.clone()),
            _ => None,
        }
    }

    /// Move to `Registered(account)`.
    ///
    /// Returns the previously bound account, or `Err(Closed)` once the
    /// connection reached `Closed`.
    pub fn bind(&self, account: AccountId) -> Result<Option<AccountId>, ConnectionError> {
        let mut phase = self.phase.lock();
        match std::mem::replace(&mut *phase, ConnectionPhase::Registered(account)) {
            ConnectionPhase::Connected => Ok(None),
            ConnectionPhase::Registered(previous) => Ok(Some(previous)),
            ConnectionPhase::Closed => {
                *phase = ConnectionPhase::Closed;
                Err(ConnectionError::Closed)
            }
        }
    }

    /// Move to `Closed` and cancel the connection.
    ///
    /// Returns the phase that was left on the first call and `None` on every
    /// later call, so exactly one caller runs the cleanup.
    pub fn mark_closed(&self) -> Option<ConnectionPhase> {
        let previous = {
            let mut phase = self.phase.lock();
            if *phase == ConnectionPhase::Closed {
                return None;
            }
            std::mem::replace(&mut *phase, ConnectionPhase::Closed)
        };
        self.cancel.cancel();
        Some(previous)
    }

    /// Record client activity (any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Read and reset the alive flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last inbound activity.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("phase", &*self.phase.lock())
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
