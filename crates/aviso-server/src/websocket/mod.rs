//! WebSocket connection handling, identity registration and delivery.

pub mod broadcast;
pub mod connection;
pub mod handshake;
pub mod heartbeat;
pub mod lifecycle;
pub mod notifier;
pub mod registry;
pub mod session;
