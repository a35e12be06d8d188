//! String <-> message conversion for the bridge transport.
//!
//! Decoding is two-phase: the raw string is parsed into a JSON value, its
//! `type` is checked against the receiving direction's vocabulary, and only
//! then is the typed payload decoded. This lets receivers tell an unknown
//! command (ignored, for forward compatibility) apart from a malformed one
//! (reported as `MESSAGE_PARSE_ERROR`).

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::messages::{GuestMessage, HostMessage, GUEST_MESSAGE_TYPES, HOST_MESSAGE_TYPES};

/// Why an inbound string could not be turned into a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    Syntax(String),
    #[error("Message is not a JSON object")]
    NotAnObject,
    #[error("Message has no string `type` field")]
    MissingType,
    #[error("Unknown message type: {0}")]
    UnknownType(String),
    #[error("Invalid {message_type} payload: {reason}")]
    InvalidPayload {
        message_type: String,
        reason: String,
    },
}

impl ParseError {
    /// Unknown types are tolerated by receivers rather than reported.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, ParseError::UnknownType(_))
    }
}

/// Encode a message for the transport.
///
/// Message types only contain string-keyed maps and derive-generated
/// `Serialize` impls, so encoding cannot fail for any well-typed value.
pub fn serialize<M: Serialize>(message: &M) -> String {
    serde_json::to_string(message).unwrap_or_default()
}

/// Decode a command arriving at the guest.
pub fn parse_host_message(raw: &str) -> Result<HostMessage, ParseError> {
    decode(raw, &HOST_MESSAGE_TYPES)
}

/// Decode an event arriving at the host.
pub fn parse_guest_message(raw: &str) -> Result<GuestMessage, ParseError> {
    decode(raw, &GUEST_MESSAGE_TYPES)
}

/// True when `value` is an object whose `type` belongs to the host→guest vocabulary.
pub fn is_host_message(value: &Value) -> bool {
    has_type_in(value, &HOST_MESSAGE_TYPES)
}

/// True when `value` is an object whose `type` belongs to the guest→host vocabulary.
pub fn is_guest_message(value: &Value) -> bool {
    has_type_in(value, &GUEST_MESSAGE_TYPES)
}

/// Best-effort recovery of `messageId` from a payload that failed to decode,
/// so a parse failure can still be reported against the right request.
pub fn extract_message_id(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    value.get("messageId")?.as_str().map(str::to_owned)
}

fn has_type_in(value: &Value, vocabulary: &[&str]) -> bool {
    value
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| vocabulary.contains(&t))
}

fn decode<M: DeserializeOwned>(raw: &str, vocabulary: &[&str]) -> Result<M, ParseError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ParseError::Syntax(e.to_string()))?;
    let object = value.as_object().ok_or(ParseError::NotAnObject)?;
    let message_type = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingType)?
        .to_owned();

    if !vocabulary.contains(&message_type.as_str()) {
        return Err(ParseError::UnknownType(message_type));
    }

    serde_json::from_value(value).map_err(|e| ParseError::InvalidPayload {
        message_type,
        reason: e.to_string(),
    })
}
