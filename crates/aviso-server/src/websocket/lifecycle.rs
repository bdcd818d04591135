//! Connection lifecycle: welcome on open, handshake per frame, pruning on close.

use std::fmt::Display;
use std::sync::Arc;

use aviso_core::{AccountId, HandshakeError, NotificationMessage};
use chrono::Utc;
use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use super::broadcast::BroadcastManager;
use super::connection::{ClientConnection, ConnectionError, ConnectionPhase};
use super::handshake::{Handshake, HandshakeOutcome};
use super::registry::IdentityRegistry;
use crate::metrics::{
    DECODE_ERRORS_TOTAL, REGISTRATION_ERRORS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Reacts to transport events on each connection.
pub struct LifecycleSupervisor {
    registry: Arc<IdentityRegistry>,
    connections: Arc<BroadcastManager>,
    handshake: Handshake,
}

impl LifecycleSupervisor {
    /// Create a supervisor over the shared registry and connection set.
    pub fn new(
        registry: Arc<IdentityRegistry>,
        connections: Arc<BroadcastManager>,
        admin_account_id: AccountId,
    ) -> Self {
        let handshake = Handshake::new(Arc::clone(&registry), admin_account_id);
        Self {
            registry,
            connections,
            handshake,
        }
    }

    /// Track a new connection and queue the welcome frame.
    ///
    /// Runs before the first inbound frame is read, so the welcome is always
    /// the first frame the client sees.
    pub fn on_open(&self, connection: &Arc<ClientConnection>) -> Result<(), ConnectionError> {
        self.connections.add(Arc::clone(connection));
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(conn_id = %connection.id(), "client connected");

        let welcome = NotificationMessage::welcome(Utc::now());
        let frame = welcome.to_json().map_err(|e| {
            warn!(conn_id = %connection.id(), error = %e, "failed to serialize welcome");
            ConnectionError::Closed
        })?;
        connection.send(Arc::new(frame)).inspect_err(|e| {
            warn!(conn_id = %connection.id(), error = %e, "failed to queue welcome");
        })
    }

    /// Hand one inbound text frame to the handshake.
    ///
    /// Failures are logged and counted; they never close the connection or
    /// remove registry entries.
    pub fn on_message(
        &self,
        connection: &Arc<ClientConnection>,
        text: &str,
    ) -> Result<HandshakeOutcome, HandshakeError> {
        let result = self.handshake.process_frame(connection, text);
        if let Err(e) = &result {
            if e.is_decode() {
                counter!(DECODE_ERRORS_TOTAL, "reason" => e.label()).increment(1);
                warn!(conn_id = %connection.id(), error = %e, "dropping malformed frame");
            } else {
                counter!(REGISTRATION_ERRORS_TOTAL, "reason" => e.label()).increment(1);
                warn!(conn_id = %connection.id(), error = %e, "rejecting registration");
            }
        }
        result
    }

    /// Log a transport error. Cleanup is left to [`on_close`](Self::on_close).
    pub fn on_error(&self, connection: &ClientConnection, error: &dyn Display) {
        warn!(
            conn_id = %connection.id(),
            account_id = ?connection.account(),
            error = %error,
            "websocket error"
        );
    }

    /// Run the close path for `connection`.
    ///
    /// The first call moves the connection to `Closed`, prunes every registry
    /// entry bound to it and stops tracking it; it returns the pruned
    /// accounts. Later calls return `None` and do nothing.
    pub fn on_close(&self, connection: &ClientConnection) -> Option<Vec<AccountId>> {
        let previous = connection.mark_closed()?;
        let pruned = self.registry.remove_by_connection(connection.id());
        let _ = self.connections.remove(connection.id());

        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        if let ConnectionPhase::Registered(account) = &previous {
            if pruned.is_empty() {
                debug!(
                    conn_id = %connection.id(),
                    account_id = %account,
                    "account had already moved to another connection"
                );
            }
        }
        info!(
            conn_id = %connection.id(),
            pruned = pruned.len(),
            duration_secs = connection.age().as_secs_f64(),
            idle_secs = connection.last_seen_elapsed().as_secs_f64(),
            "client disconnected"
        );
        Some(pruned)
    }

    /// The handshake used for inbound frames.
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }
}
