//! Targeted and broadcast delivery.
//!
//! Delivery is best effort and at most once: a notification for an account
//! that is not connected is dropped, never queued or retried. The notifier
//! never touches registry entries; pruning belongs to the close path.

use std::sync::Arc;

use aviso_core::{AccountId, NotificationMessage, UserData};
use chrono::Utc;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use super::broadcast::{BroadcastManager, BroadcastReport};
use super::connection::ConnectionError;
use super::registry::IdentityRegistry;
use crate::metrics::{NOTIFICATIONS_DELIVERED_TOTAL, NOTIFICATIONS_SKIPPED_TOTAL};

/// Why a notification was not handed to a connection.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SkipReason {
    /// No connection is registered for the target.
    #[error("account is not registered")]
    NotRegistered,
    /// The registered connection is no longer open.
    #[error("connection is closed")]
    ConnectionClosed,
    /// The connection refused the frame.
    #[error("transport error: {0}")]
    Transport(ConnectionError),
    /// The message could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),
}

impl SkipReason {
    /// Stable label used for metrics and HTTP responses.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotRegistered => "not_registered",
            Self::ConnectionClosed => "connection_closed",
            Self::Transport(_) => "transport",
            Self::Encode(_) => "encode",
        }
    }
}

/// Result of one targeted delivery attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryResult {
    /// The frame was queued on the target's connection.
    Delivered,
    /// The frame was dropped.
    Skipped(SkipReason),
}

impl DeliveryResult {
    /// Whether the frame was queued.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Why the frame was dropped, if it was.
    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            Self::Delivered => None,
            Self::Skipped(reason) => Some(reason),
        }
    }
}

/// Sends notifications to registered accounts and to every open connection.
pub struct Notifier {
    registry: Arc<IdentityRegistry>,
    connections: Arc<BroadcastManager>,
    admin_account_id: AccountId,
}

impl Notifier {
    /// Create a notifier over `registry` and `connections`.
    pub fn new(
        registry: Arc<IdentityRegistry>,
        connections: Arc<BroadcastManager>,
        admin_account_id: AccountId,
    ) -> Self {
        Self {
            registry,
            connections,
            admin_account_id,
        }
    }

    /// Account that receives new-registration notices.
    pub fn admin_account_id(&self) -> &AccountId {
        &self.admin_account_id
    }

    /// Deliver `message` to the connection registered for `target`.
    pub fn notify(&self, target: &AccountId, message: &NotificationMessage) -> DeliveryResult {
        let result = self.attempt(target, message);
        match &result {
            DeliveryResult::Delivered => {
                counter!(NOTIFICATIONS_DELIVERED_TOTAL).increment(1);
                debug!(account_id = %target, kind = message.kind(), "notification delivered");
            }
            DeliveryResult::Skipped(reason) => {
                counter!(NOTIFICATIONS_SKIPPED_TOTAL, "reason" => reason.label()).increment(1);
                debug!(
                    account_id = %target,
                    kind = message.kind(),
                    reason = %reason,
                    "notification skipped"
                );
            }
        }
        result
    }

    fn attempt(&self, target: &AccountId, message: &NotificationMessage) -> DeliveryResult {
        let Some(connection) = self.registry.lookup(target) else {
            return DeliveryResult::Skipped(SkipReason::NotRegistered);
        };
        if !connection.is_open() {
            return DeliveryResult::Skipped(SkipReason::ConnectionClosed);
        }
        let frame = match message.to_json() {
            Ok(json) => Arc::new(json),
            Err(e) => return DeliveryResult::Skipped(SkipReason::Encode(e.to_string())),
        };
        match connection.send(frame) {
            Ok(()) => DeliveryResult::Delivered,
            Err(e) => DeliveryResult::Skipped(SkipReason::Transport(e)),
        }
    }

    /// Tell the admin account that `user` just signed up.
    pub fn notify_new_registration(&self, user: &UserData) -> DeliveryResult {
        let message = NotificationMessage::new_registration(user, Utc::now());
        self.notify(&self.admin_account_id, &message)
    }

    /// Send `message` to every open connection, registered or not.
    pub fn broadcast(&self, message: &NotificationMessage) -> BroadcastReport {
        let frame = match message.to_json() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "failed to serialize broadcast");
                return BroadcastReport::default();
            }
        };
        let report = self.connections.broadcast_all(&frame);
        counter!(NOTIFICATIONS_DELIVERED_TOTAL).increment(report.delivered as u64);
        if report.skipped > 0 {
            counter!(NOTIFICATIONS_SKIPPED_TOTAL, "reason" => "transport")
                .increment(report.skipped as u64);
        }
        report
    }
}
