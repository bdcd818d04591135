//! Registration handshake: turns inbound control frames into registry entries.

use std::sync::Arc;

use aviso_core::messages::{REGISTER, REGISTER_ADMIN};
use aviso_core::{AccountId, ConnectionId, ControlMessage, HandshakeError};
use metrics::counter;
use tracing::{debug, info};

use super::connection::ClientConnection;
use super::registry::IdentityRegistry;
use crate::metrics::REGISTRATIONS_TOTAL;

/// What a well-formed frame did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The connection is now bound to `account_id`.
    Registered {
        /// Bound identity.
        account_id: AccountId,
        /// Another connection that held the account until now.
        displaced: Option<ConnectionId>,
    },
    /// A frame kind the relay does not act on.
    Ignored {
        /// Its `type`.
        kind: String,
    },
    /// The connection is closed; the frame was dropped.
    Discarded,
}

/// Validates registration claims and installs them in the registry.
pub struct Handshake {
    registry: Arc<IdentityRegistry>,
    admin_account_id: AccountId,
}

impl Handshake {
    /// Create a handshake bound to `registry`.
    pub fn new(registry: Arc<IdentityRegistry>, admin_account_id: AccountId) -> Self {
        Self {
            registry,
            admin_account_id,
        }
    }

    /// Account allowed to use `REGISTER_ADMIN`.
    pub fn admin_account_id(&self) -> &AccountId {
        &self.admin_account_id
    }

    /// Process one inbound text frame from `connection`.
    ///
    /// Errors are per frame; the connection stays usable either way.
    pub fn process_frame(
        &self,
        connection: &Arc<ClientConnection>,
        text: &str,
    ) -> Result<HandshakeOutcome, HandshakeError> {
        if connection.is_closed() {
            return Ok(HandshakeOutcome::Discarded);
        }
        match ControlMessage::decode(text)? {
            ControlMessage::Register { account_id } => {
                Ok(self.register(connection, account_id, REGISTER))
            }
            ControlMessage::RegisterAdmin { account_id } => {
                if account_id != self.admin_account_id {
                    return Err(HandshakeError::NotAdmin {
                        claimed: account_id,
                    });
                }
                Ok(self.register(connection, account_id, REGISTER_ADMIN))
            }
            ControlMessage::Unknown { kind } => {
                debug!(conn_id = %connection.id(), kind = kind.as_str(), "ignoring unknown control frame");
                Ok(HandshakeOutcome::Ignored { kind })
            }
        }
    }

    fn register(
        &self,
        connection: &Arc<ClientConnection>,
        account_id: AccountId,
        kind: &'static str,
    ) -> HandshakeOutcome {
        let conn_id = connection.id();
        let Ok(previous) = connection.bind(account_id.clone()) else {
            return HandshakeOutcome::Discarded;
        };
        if let Some(previous) = previous.filter(|p| *p != account_id) {
            let _ = self.registry.remove_if_bound(&previous, conn_id);
            debug!(conn_id = %conn_id, account_id = %previous, "released previous account");
        }

        let displaced = self
            .registry
            .register(account_id.clone(), Arc::clone(connection))
            .map(|record| record.connection.id().clone())
            .filter(|id| id != conn_id);

        // A close that raced with this registration has already pruned.
        if connection.is_closed() {
            let _ = self.registry.remove_if_bound(&account_id, conn_id);
            return HandshakeOutcome::Discarded;
        }

        counter!(REGISTRATIONS_TOTAL, "kind" => kind).increment(1);
        match &displaced {
            Some(old) => info!(
                conn_id = %conn_id,
                account_id = %account_id,
                displaced = %old,
                "client registered, replacing previous connection"
            ),
            None => info!(conn_id = %conn_id, account_id = %account_id, "client registered"),
        }
        HandshakeOutcome::Registered {
            account_id,
            displaced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use aviso_core::logging::capture_logs;
    use tokio::sync::mpsc;
    use tracing::Level;

    fn setup() -> (Handshake, Arc<IdentityRegistry>) {
        let registry = Arc::new(IdentityRegistry::new());
        (Handshake::new(registry.clone(), AccountId::Numeric(1)), registry)
    }

    fn make_connection() -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(ClientConnection::new(ConnectionId::new(), tx)), rx)
    }

    #[test]
    fn register_binds_connection() {
        let (handshake, registry) = setup();
        let (conn, _rx) = make_connection();

        let outcome = handshake
            .process_frame(&conn, r#"{"type":"REGISTER","accountId":7}"#)
            .unwrap();
        assert_eq!(
            outcome,
            HandshakeOutcome::Registered {
                account_id: AccountId::Numeric(7),
                displaced: None,
            }
        );
        assert_eq!(registry.lookup(&AccountId::Numeric(7)).unwrap().id(), conn.id());
        assert_eq!(conn.account(), Some(AccountId::Numeric(7)));
    }

    #[test]
    fn string_and_numeric_claims_are_one_identity() {
        let (handshake, registry) = setup();
        let (a, _rx1) = make_connection();
        let (b, _rx2) = make_connection();
        let _ = handshake.process_frame(&a, r#"{"type":"REGISTER","accountId":"4"}"#).unwrap();
        let outcome = handshake
            .process_frame(&b, r#"{"type":"REGISTER","id_cuenta":4}"#)
            .unwrap();

        assert_matches!(outcome, HandshakeOutcome::Registered { displaced: Some(id), .. } if &id == a.id());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(&AccountId::Numeric(4)).unwrap().id(), b.id());
        // displaced connection stays open
        assert!(a.is_open());
    }

    #[test]
    fn repeated_register_same_account_is_not_displacement() {
        let (handshake, registry) = setup();
        let (conn, _rx) = make_connection();
        let frame = r#"{"type":"REGISTER","accountId":2}"#;
        let _ = handshake.process_frame(&conn, frame).unwrap();
        let outcome = handshake.process_frame(&conn, frame).unwrap();
        assert_matches!(outcome, HandshakeOutcome::Registered { displaced: None, .. });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reregister_under_new_account_releases_old_binding() {
        let (handshake, registry) = setup();
        let (conn, _rx) = make_connection();
        let _ = handshake.process_frame(&conn, r#"{"type":"REGISTER","accountId":2}"#).unwrap();
        let _ = handshake.process_frame(&conn, r#"{"type":"REGISTER","accountId":3}"#).unwrap();

        assert!(registry.lookup(&AccountId::Numeric(2)).is_none());
        assert!(registry.lookup(&AccountId::Numeric(3)).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reregister_does_not_release_account_taken_by_other_connection() {
        let (handshake, registry) = setup();
        let (a, _rx1) = make_connection();
        let (b, _rx2) = make_connection();
        let _ = handshake.process_frame(&a, r#"{"type":"REGISTER","accountId":2}"#).unwrap();
        let _ = handshake.process_frame(&b, r#"{"type":"REGISTER","accountId":2}"#).unwrap();
        let _ = handshake.process_frame(&a, r#"{"type":"REGISTER","accountId":3}"#).unwrap();

        assert_eq!(registry.lookup(&AccountId::Numeric(2)).unwrap().id(), b.id());
        assert_eq!(registry.lookup(&AccountId::Numeric(3)).unwrap().id(), a.id());
    }

    #[test]
    fn register_admin_requires_admin_id() {
        let (handshake, registry) = setup();
        let (conn, _rx) = make_connection();

        let err = handshake
            .process_frame(&conn, r#"{"type":"REGISTER_ADMIN","id_cuenta":2}"#)
            .unwrap_err();
        assert_matches!(err, HandshakeError::NotAdmin { claimed: AccountId::Numeric(2) });
        assert!(registry.is_empty());

        let outcome = handshake
            .process_frame(&conn, r#"{"type":"REGISTER_ADMIN","id_cuenta":"1"}"#)
            .unwrap();
        assert_matches!(outcome, HandshakeOutcome::Registered { account_id: AccountId::Numeric(1), .. });
    }

    #[test]
    fn invalid_claims_register_nothing() {
        let (handshake, registry) = setup();
        let (conn, _rx) = make_connection();
        for frame in [
            r#"{"type":"REGISTER"}"#,
            r#"{"type":"REGISTER","accountId":null}"#,
            r#"{"type":"REGISTER","accountId":true}"#,
            r#"{"type":"REGISTER","accountId":""}"#,
        ] {
            let err = handshake.process_frame(&conn, frame).unwrap_err();
            assert!(!err.is_decode(), "{frame}");
        }
        assert!(registry.is_empty());
        assert!(conn.account().is_none());
    }

    #[test]
    fn malformed_frames_are_decode_errors() {
        let (handshake, registry) = setup();
        let (conn, _rx) = make_connection();
        for frame in ["", "not json", "42", r#"{"accountId":1}"#] {
            let err = handshake.process_frame(&conn, frame).unwrap_err();
            assert!(err.is_decode(), "{frame}");
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_kind_is_ignored() {
        let (logs, _guard) = capture_logs();
        let (handshake, registry) = setup();
        let (conn, _rx) = make_connection();
        let outcome = handshake.process_frame(&conn, r#"{"type":"PING"}"#).unwrap();
        assert_eq!(outcome, HandshakeOutcome::Ignored { kind: "PING".into() });
        assert!(registry.is_empty());
        assert!(logs.has_event(Level::DEBUG, "unknown control frame"));
    }

    #[test]
    fn frames_after_close_are_discarded() {
        let (handshake, registry) = setup();
        let (conn, _rx) = make_connection();
        let _ = conn.mark_closed();
        let outcome = handshake
            .process_frame(&conn, r#"{"type":"REGISTER","accountId":1}"#)
            .unwrap();
        assert_eq!(outcome, HandshakeOutcome::Discarded);
        assert!(registry.is_empty());
    }

    #[test]
    fn close_signal_before_register_leaves_no_entry() {
        let (handshake, registry) = setup();
        let (conn, _rx) = make_connection();
        conn.close();
        let outcome = handshake
            .process_frame(&conn, r#"{"type":"REGISTER","accountId":1}"#)
            .unwrap();
        assert_eq!(outcome, HandshakeOutcome::Discarded);
        assert!(registry.is_empty());
    }

    #[test]
    fn registration_is_logged() {
        let (logs, _guard) = capture_logs();
        let (handshake, _registry) = setup();
        let (conn, _rx) = make_connection();
        let _ = handshake
            .process_frame(&conn, r#"{"type":"REGISTER","accountId":1}"#)
            .unwrap();
        let events = logs.events();
        let event = events.iter().find(|e| e.message == "client registered").unwrap();
        assert_eq!(event.field("account_id"), Some("1"));
        assert_eq!(event.level, Level::INFO);
    }
}
