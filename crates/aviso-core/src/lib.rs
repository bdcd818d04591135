//! # aviso-core
//!
//! Shared vocabulary for the aviso notification relay:
//!
//! - **Identifiers**: [`AccountId`] (integer or text, canonicalized) and
//!   [`ConnectionId`] (one per accepted connection)
//! - **Wire messages**: inbound [`ControlMessage`] and outbound
//!   [`NotificationMessage`], both closed tagged enums
//! - **Errors**: [`HandshakeError`] for per-frame decode and registration failures
//! - **Logging**: subscriber setup and in-memory log capture for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod messages;

pub use errors::HandshakeError;
pub use ids::{AccountId, ConnectionId, InvalidAccountId};
pub use messages::{ControlMessage, NotificationMessage, RegistrationData, UserData};
