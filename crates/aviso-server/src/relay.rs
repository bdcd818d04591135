//! The relay: registry, connection set, notifier and supervisor wired together.

use std::sync::Arc;

use aviso_core::AccountId;

use crate::websocket::broadcast::BroadcastManager;
use crate::websocket::lifecycle::LifecycleSupervisor;
use crate::websocket::notifier::Notifier;
use crate::websocket::registry::IdentityRegistry;

/// Process-local notification relay.
///
/// Built once at startup and shared through `Arc` with HTTP handlers and
/// every WebSocket session.
pub struct Relay {
    registry: Arc<IdentityRegistry>,
    connections: Arc<BroadcastManager>,
    notifier: Notifier,
    supervisor: LifecycleSupervisor,
}

impl Relay {
    /// Create an empty relay. `admin_account_id` receives new-registration
    /// notices and is the only id accepted by `REGISTER_ADMIN`.
    pub fn new(admin_account_id: AccountId) -> Self {
        let registry = Arc::new(IdentityRegistry::new());
        let connections = Arc::new(BroadcastManager::new());
        Self {
            notifier: Notifier::new(
                Arc::clone(&registry),
                Arc::clone(&connections),
                admin_account_id.clone(),
            ),
            supervisor: LifecycleSupervisor::new(
                Arc::clone(&registry),
                Arc::clone(&connections),
                admin_account_id,
            ),
            registry,
            connections,
        }
    }

    /// Identity registry.
    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    /// Set of open connections.
    pub fn connections(&self) -> &Arc<BroadcastManager> {
        &self.connections
    }

    /// Targeted and broadcast delivery.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Lifecycle hooks for sessions.
    pub fn supervisor(&self) -> &LifecycleSupervisor {
        &self.supervisor
    }

    /// Registered accounts whose connection is still open
    /// (`activeConnections` in `/health`).
    pub fn active_connections(&self) -> usize {
        self.registry.open_count()
    }

    /// Open connections, registered or not (`totalClients` in `/health`).
    pub fn total_clients(&self) -> usize {
        self.connections.connection_count()
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(AccountId::default())
    }
}
