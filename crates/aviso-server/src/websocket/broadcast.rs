//! Set of every open connection, registered or not, and fan-out to it.

use std::collections::HashMap;
use std::sync::Arc;

use aviso_core::ConnectionId;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use super::connection::ClientConnection;

/// Outcome of a fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Connections that accepted the frame.
    pub delivered: usize,
    /// Connections that were closing or had a full queue.
    pub skipped: usize,
}

/// Tracks every accepted connection for counts and broadcast.
#[derive(Default)]
pub struct BroadcastManager {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl BroadcastManager {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection.
    pub fn add(&self, connection: Arc<ClientConnection>) {
        let _ = self
            .connections
            .write()
            .insert(connection.id().clone(), connection);
    }

    /// Stop tracking a connection. Returns whether it was tracked.
    pub fn remove(&self, connection_id: &ConnectionId) -> bool {
        self.connections.write().remove(connection_id).is_some()
    }

    /// Number of tracked connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Snapshot of the tracked connections that are still open.
    pub fn open_connections(&self) -> Vec<Arc<ClientConnection>> {
        self.connections
            .read()
            .values()
            .filter(|c| c.is_open())
            .cloned()
            .collect()
    }

    /// Queue `frame` on every open connection.
    ///
    /// Sends happen on a snapshot taken outside the lock.
    pub fn broadcast_all(&self, frame: &Arc<String>) -> BroadcastReport {
        let recipients = self.open_connections();
        let mut report = BroadcastReport::default();
        for conn in &recipients {
            match conn.send(Arc::clone(frame)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.skipped += 1;
                    warn!(conn_id = %conn.id(), error = %e, "failed to send broadcast to client");
                }
            }
        }
        debug!(
            recipients = recipients.len(),
            delivered = report.delivered,
            "broadcast to all"
        );
        report
    }
}
