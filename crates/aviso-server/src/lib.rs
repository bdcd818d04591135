//! # aviso-server
//!
//! Axum HTTP + `WebSocket` server for the aviso notification relay.
//!
//! - `WebSocket` gateway: welcome on connect, `REGISTER` handshake, heartbeat
//! - Identity registry mapping account ids to live connections
//! - Targeted and broadcast notifications with best-effort delivery
//! - HTTP endpoints: health, Prometheus metrics, notification triggers
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::ServerError;
pub use relay::Relay;
pub use server::AvisoServer;
