//! Identity registry: account id → live connection.
//!
//! At most one entry per account; the last registration wins. The registry
//! only holds a shared handle to the connection and never closes it.

use std::collections::HashMap;
use std::sync::Arc;

use aviso_core::{AccountId, ConnectionId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::warn;

use super::connection::ClientConnection;

/// One registry entry.
#[derive(Clone, Debug)]
pub struct ConnectionRecord {
    /// Registered identity.
    pub account_id: AccountId,
    /// The connection bound to it.
    pub connection: Arc<ClientConnection>,
    /// When the handshake completed.
    pub registered_at: DateTime<Utc>,
}

/// Concurrency-safe map from account id to connection.
///
/// Every operation takes the lock once and never awaits while holding it.
#[derive(Default)]
pub struct IdentityRegistry {
    entries: RwLock<HashMap<AccountId, ConnectionRecord>>,
}

impl IdentityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `account_id` to `connection`, returning the displaced record.
    pub fn register(
        &self,
        account_id: AccountId,
        connection: Arc<ClientConnection>,
    ) -> Option<ConnectionRecord> {
        let record = ConnectionRecord {
            account_id: account_id.clone(),
            connection,
            registered_at: Utc::now(),
        };
        self.entries.write().insert(account_id, record)
    }

    /// Connection currently bound to `account_id`.
    pub fn lookup(&self, account_id: &AccountId) -> Option<Arc<ClientConnection>> {
        self.entries
            .read()
            .get(account_id)
            .map(|record| Arc::clone(&record.connection))
    }

    /// Full record for `account_id`.
    pub fn record(&self, account_id: &AccountId) -> Option<ConnectionRecord> {
        self.entries.read().get(account_id).cloned()
    }

    /// Remove the entry for `account_id`, if any.
    pub fn remove(&self, account_id: &AccountId) -> Option<ConnectionRecord> {
        self.entries.write().remove(account_id)
    }

    /// Remove every entry bound to `connection_id`.
    pub fn remove_by_connection(&self, connection_id: &ConnectionId) -> Vec<AccountId> {
        let mut entries = self.entries.write();
        let matched: Vec<AccountId> = entries
            .iter()
            .filter(|(_, record)| record.connection.id() == connection_id)
            .map(|(account, _)| account.clone())
            .collect();
        for account in &matched {
            let _ = entries.remove(account);
        }
        drop(entries);

        if matched.len() > 1 {
            warn!(
                conn_id = %connection_id,
                count = matched.len(),
                "connection was bound to more than one account"
            );
        }
        matched
    }

    /// Remove `account_id` only while it still points at `connection_id`.
    pub fn remove_if_bound(&self, account_id: &AccountId, connection_id: &ConnectionId) -> bool {
        let mut entries = self.entries.write();
        let bound = entries
            .get(account_id)
            .is_some_and(|record| record.connection.id() == connection_id);
        if bound {
            let _ = entries.remove(account_id);
        }
        bound
    }

    /// Number of registered accounts.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no account is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Registered account ids, in no particular order.
    pub fn accounts(&self) -> Vec<AccountId> {
        self.entries.read().keys().cloned().collect()
    }

    /// Registered entries whose connection is still open.
    pub fn open_count(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|record| record.connection.is_open())
            .count()
    }
}
