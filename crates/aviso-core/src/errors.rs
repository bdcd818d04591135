//! Per-frame handshake errors.
//!
//! Every variant is recoverable: the frame is dropped, the error is logged, and
//! the connection stays open. Nothing is reported back to the client.

use thiserror::Error;

use crate::ids::AccountId;

/// Failure to turn one inbound text frame into a registration.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The frame is not valid JSON.
    #[error("malformed control frame: {0}")]
    Decode(#[from] serde_json::Error),

    /// The frame is JSON but not an object.
    #[error("control frame is not a JSON object")]
    NotAnObject,

    /// The object has no string `type` discriminator.
    #[error("control frame has no type discriminator")]
    MissingType,

    /// A registration frame carried no usable account id.
    #[error("{kind} frame has an invalid account id: {detail}")]
    InvalidAccountId {
        /// Message kind that carried the claim.
        kind: &'static str,
        /// What was wrong with the value.
        detail: String,
    },

    /// A `REGISTER_ADMIN` frame claimed an id other than the admin account.
    #[error("REGISTER_ADMIN claimed non-admin account {claimed}")]
    NotAdmin {
        /// The claimed account id.
        claimed: AccountId,
    },
}

impl HandshakeError {
    /// Whether the frame failed to decode at all (as opposed to decoding into
    /// a registration claim that was then rejected).
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::NotAnObject | Self::MissingType)
    }

    /// Stable label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Decode(_) => "malformed",
            Self::NotAnObject => "not_object",
            Self::MissingType => "missing_type",
            Self::InvalidAccountId { .. } => "invalid_account_id",
            Self::NotAdmin { .. } => "not_admin",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_variants_classified() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(HandshakeError::Decode(json_err).is_decode());
        assert!(HandshakeError::NotAnObject.is_decode());
        assert!(HandshakeError::MissingType.is_decode());
    }

    #[test]
    fn registration_variants_not_decode() {
        let err = HandshakeError::InvalidAccountId {
            kind: "REGISTER",
            detail: "null".into(),
        };
        assert!(!err.is_decode());
        assert!(!HandshakeError::NotAdmin { claimed: AccountId::Numeric(9) }.is_decode());
    }

    #[test]
    fn display_includes_context() {
        let err = HandshakeError::NotAdmin { claimed: AccountId::Numeric(9) };
        assert_eq!(err.to_string(), "REGISTER_ADMIN claimed non-admin account 9");
        let err = HandshakeError::InvalidAccountId {
            kind: "REGISTER",
            detail: "missing".into(),
        };
        assert!(err.to_string().contains("REGISTER frame"));
    }

    #[test]
    fn labels_are_snake_case() {
        let labels = [
            HandshakeError::NotAnObject.label(),
            HandshakeError::MissingType.label(),
            HandshakeError::NotAdmin { claimed: AccountId::Numeric(1) }.label(),
        ];
        for label in labels {
            assert!(label.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
