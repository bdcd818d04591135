//! Wire messages exchanged over the WebSocket.
//!
//! Both directions are closed sets. Inbound frames decode into
//! [`ControlMessage`]; kinds the relay does not understand land in
//! [`ControlMessage::Unknown`] and are ignored by the handshake. Outbound
//! frames are [`NotificationMessage`] values serialized with a `type` tag.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::HandshakeError;
use crate::ids::AccountId;

/// `type` of the client registration frame.
pub const REGISTER: &str = "REGISTER";
/// `type` of the admin-only registration frame.
pub const REGISTER_ADMIN: &str = "REGISTER_ADMIN";
/// `type` of the welcome frame.
pub const CONNECTION_ESTABLISHED: &str = "CONEXION_ESTABLECIDA";
/// `type` of the new-user notification frame.
pub const NEW_REGISTRATION: &str = "NUEVO_REGISTRO";

/// Status token carried by the welcome frame.
pub const WELCOME_STATUS: &str = "OK";

/// Decoded client → server control frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlMessage {
    /// Bind the sending connection to `account_id`.
    Register {
        /// Claimed identity.
        account_id: AccountId,
    },
    /// Bind the sending connection to `account_id` if it is the admin account.
    RegisterAdmin {
        /// Claimed identity.
        account_id: AccountId,
    },
    /// Any other `type`; accepted and ignored.
    Unknown {
        /// The unrecognized discriminator.
        kind: String,
    },
}

impl ControlMessage {
    /// Decode one text frame.
    ///
    /// The account id is read from `accountId`, falling back to `id_cuenta`.
    pub fn decode(text: &str) -> Result<Self, HandshakeError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(fields) = value else {
            return Err(HandshakeError::NotAnObject);
        };
        let kind = fields
            .get("type")
            .and_then(Value::as_str)
            .ok_or(HandshakeError::MissingType)?;

        match kind {
            REGISTER => Ok(Self::Register {
                account_id: claimed_account(&fields, REGISTER)?,
            }),
            REGISTER_ADMIN => Ok(Self::RegisterAdmin {
                account_id: claimed_account(&fields, REGISTER_ADMIN)?,
            }),
            other => Ok(Self::Unknown {
                kind: other.to_owned(),
            }),
        }
    }

    /// The frame's `type` discriminator.
    pub fn kind(&self) -> &str {
        match self {
            Self::Register { .. } => REGISTER,
            Self::RegisterAdmin { .. } => REGISTER_ADMIN,
            Self::Unknown { kind } => kind.as_str(),
        }
    }
}

fn claimed_account(
    fields: &Map<String, Value>,
    kind: &'static str,
) -> Result<AccountId, HandshakeError> {
    let present = |key: &str| fields.get(key).filter(|v| !v.is_null());
    let Some(raw) = present("accountId").or_else(|| present("id_cuenta")) else {
        return Err(HandshakeError::InvalidAccountId {
            kind,
            detail: "missing".into(),
        });
    };
    AccountId::from_json(raw).map_err(|e| HandshakeError::InvalidAccountId {
        kind,
        detail: e.0,
    })
}

/// User fields handed over by the account-creation collaborator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    /// Given names.
    #[serde(default)]
    pub nombres: Option<String>,
    /// Paternal surname.
    #[serde(default, rename = "apellidoPat")]
    pub apellido_pat: Option<String>,
    /// Email address.
    #[serde(default)]
    pub correo: Option<String>,
    /// Username.
    #[serde(default)]
    pub usuario: Option<String>,
}

/// Payload of a `NUEVO_REGISTRO` frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationData {
    /// Given names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nombres: Option<String>,
    /// Paternal surname.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apellido: Option<String>,
    /// Email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correo: Option<String>,
    /// Username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usuario: Option<String>,
    /// ISO-8601 UTC time the notification was built.
    pub timestamp: String,
}

/// Server → client frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotificationMessage {
    /// Sent once, right after the connection opens.
    #[serde(rename = "CONEXION_ESTABLECIDA")]
    ConnectionEstablished {
        /// Status token, always [`WELCOME_STATUS`].
        status: String,
        /// ISO-8601 UTC time of the welcome.
        timestamp: String,
    },
    /// A new user account was created.
    #[serde(rename = "NUEVO_REGISTRO")]
    NewRegistration {
        /// The new user's public fields.
        data: RegistrationData,
    },
}

impl NotificationMessage {
    /// Welcome frame stamped with `now`.
    pub fn welcome(now: DateTime<Utc>) -> Self {
        Self::ConnectionEstablished {
            status: WELCOME_STATUS.to_owned(),
            timestamp: iso_timestamp(now),
        }
    }

    /// New-registration frame for `user`, stamped with `now`.
    pub fn new_registration(user: &UserData, now: DateTime<Utc>) -> Self {
        Self::NewRegistration {
            data: RegistrationData {
                nombres: user.nombres.clone(),
                apellido: user.apellido_pat.clone(),
                correo: user.correo.clone(),
                usuario: user.usuario.clone(),
                timestamp: iso_timestamp(now),
            },
        }
    }

    /// The frame's `type` discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => CONNECTION_ESTABLISHED,
            Self::NewRegistration { .. } => NEW_REGISTRATION,
        }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// `2024-05-01T12:00:00.000Z` style timestamp.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn decode_register_with_numeric_id() {
        let msg = ControlMessage::decode(r#"{"type":"REGISTER","accountId":1}"#).unwrap();
        assert_eq!(msg, ControlMessage::Register { account_id: AccountId::Numeric(1) });
        assert_eq!(msg.kind(), REGISTER);
    }

    #[test]
    fn decode_register_with_legacy_field() {
        let msg = ControlMessage::decode(r#"{"type":"REGISTER","id_cuenta":"7"}"#).unwrap();
        assert_eq!(msg, ControlMessage::Register { account_id: AccountId::Numeric(7) });
    }

    #[test]
    fn null_account_id_falls_back_to_legacy_field() {
        let msg =
            ControlMessage::decode(r#"{"type":"REGISTER","accountId":null,"id_cuenta":3}"#)
                .unwrap();
        assert_eq!(msg, ControlMessage::Register { account_id: AccountId::Numeric(3) });
    }

    #[test]
    fn decode_register_admin() {
        let msg = ControlMessage::decode(r#"{"type":"REGISTER_ADMIN","id_cuenta":1}"#).unwrap();
        assert_eq!(msg, ControlMessage::RegisterAdmin { account_id: AccountId::Numeric(1) });
    }

    #[test]
    fn register_without_account_is_registration_error() {
        let err = ControlMessage::decode(r#"{"type":"REGISTER"}"#).unwrap_err();
        assert_matches!(err, HandshakeError::InvalidAccountId { kind: REGISTER, .. });
        assert!(!err.is_decode());
    }

    #[test]
    fn register_with_object_account_is_registration_error() {
        let err = ControlMessage::decode(r#"{"type":"REGISTER","accountId":{"id":1}}"#)
            .unwrap_err();
        assert_matches!(err, HandshakeError::InvalidAccountId { .. });
    }

    #[test]
    fn malformed_json_is_decode_error() {
        let err = ControlMessage::decode("{not json").unwrap_err();
        assert_matches!(err, HandshakeError::Decode(_));
    }

    #[test]
    fn non_object_is_decode_error() {
        assert_matches!(ControlMessage::decode("[1,2]"), Err(HandshakeError::NotAnObject));
        assert_matches!(ControlMessage::decode("\"REGISTER\""), Err(HandshakeError::NotAnObject));
    }

    #[test]
    fn missing_or_non_string_type_is_decode_error() {
        assert_matches!(ControlMessage::decode(r#"{"accountId":1}"#), Err(HandshakeError::MissingType));
        assert_matches!(ControlMessage::decode(r#"{"type":5}"#), Err(HandshakeError::MissingType));
    }

    #[test]
    fn unknown_kind_is_preserved() {
        let msg = ControlMessage::decode(r#"{"type":"CHAT","text":"hola"}"#).unwrap();
        assert_eq!(msg, ControlMessage::Unknown { kind: "CHAT".into() });
        assert_eq!(msg.kind(), "CHAT");
    }

    #[test]
    fn welcome_wire_format() {
        let value = serde_json::to_value(NotificationMessage::welcome(fixed_now())).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "CONEXION_ESTABLECIDA",
                "status": "OK",
                "timestamp": "2024-05-01T12:00:00.000Z",
            })
        );
    }

    #[test]
    fn new_registration_maps_apellido_pat() {
        let user: UserData = serde_json::from_value(json!({
            "nombres": "Ana",
            "apellidoPat": "Lopez",
            "correo": "a@x.com",
            "usuario": "ana",
        }))
        .unwrap();
        let msg = NotificationMessage::new_registration(&user, fixed_now());
        assert_eq!(msg.kind(), NEW_REGISTRATION);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "NUEVO_REGISTRO",
                "data": {
                    "nombres": "Ana",
                    "apellido": "Lopez",
                    "correo": "a@x.com",
                    "usuario": "ana",
                    "timestamp": "2024-05-01T12:00:00.000Z",
                },
            })
        );
    }

    #[test]
    fn missing_user_fields_are_omitted() {
        let user = UserData {
            usuario: Some("solo".into()),
            ..UserData::default()
        };
        let value = serde_json::to_value(NotificationMessage::new_registration(&user, fixed_now()))
            .unwrap();
        let data = value["data"].as_object().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data["usuario"], "solo");
        assert!(data.contains_key("timestamp"));
    }

    #[test]
    fn to_json_parses_back() {
        let msg = NotificationMessage::welcome(fixed_now());
        let text = msg.to_json().unwrap();
        let back: NotificationMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
    }
}
