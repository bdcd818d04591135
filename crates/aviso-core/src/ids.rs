//! Identifier newtypes.
//!
//! [`AccountId`] is the identity a client claims during the handshake. Clients
//! send it either as a JSON integer or as a string; both spellings of the same
//! integer (`1` and `"1"`) resolve to the same identity so registration and
//! notification call sites cannot drift apart.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Account identity bound to a connection by the handshake.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum AccountId {
    /// Integer identity (also produced by strings holding only an integer).
    Numeric(i64),
    /// Any other non-blank string identity.
    Text(String),
}

/// Rejected account identifier value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid account id: {0}")]
pub struct InvalidAccountId(pub String);

impl AccountId {
    /// Interpret a JSON value as an account id.
    ///
    /// Accepts integers that fit in `i64` and non-blank strings. Everything
    /// else (`null`, booleans, floats, arrays, objects) is rejected.
    pub fn from_json(value: &Value) -> Result<Self, InvalidAccountId> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(Self::Numeric)
                .ok_or_else(|| InvalidAccountId(n.to_string())),
            Value::String(s) => s.parse(),
            other => Err(InvalidAccountId(other.to_string())),
        }
    }

    /// Whether this is an integer identity.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Numeric(_))
    }
}

impl FromStr for AccountId {
    type Err = InvalidAccountId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(InvalidAccountId(s.to_owned()));
        }
        Ok(trimmed
            .parse::<i64>()
            .map_or_else(|_| Self::Text(trimmed.to_owned()), Self::Numeric))
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

impl From<i64> for AccountId {
    fn from(n: i64) -> Self {
        Self::Numeric(n)
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::Numeric(1)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Identifier of one accepted connection (`conn_<uuid v7>`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a new time-ordered connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// Create from an existing string value.
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
