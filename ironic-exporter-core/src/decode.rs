// ironic-exporter-core/src/decode.rs - Two-stage decoding of versioned node notifications

use chrono::NaiveDateTime;
use serde_json::Value;
use thiserror::Error;

use crate::event::{EventType, LifecycleEvent, Phase};

/// Key of the outer envelope whose value is the JSON-encoded notification
pub const ENVELOPE_MESSAGE_KEY: &str = "oslo.message";
/// Key of the versioned object data inside `payload`
pub const OBJECT_DATA_KEY: &str = "ironic_object.data";
/// Notification timestamps look like `2024-03-05 10:00:00.123456`, microseconds required
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

// ============ ERRORS ============

/// Reasons a raw message could not be turned into a [`LifecycleEvent`].
/// Decode failures only ever drop the message they came from.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("event type `{0}` does not have four dot-separated segments")]
    MalformedEventType(String),
    #[error("timestamp `{0}` is not formatted as YYYY-MM-DD HH:MM:SS.ffffff")]
    InvalidTimestamp(String),
}

// ============ DECODING ============

/// Decode one raw broker message body.
///
/// The body is an envelope object whose `oslo.message` field is itself a JSON string.
/// Both layers must parse, and the required keys are looked up exactly.
pub fn decode(body: &[u8]) -> Result<LifecycleEvent, DecodeError> {
    let envelope: Value = serde_json::from_slice(body)?;
    let inner = require_str(&envelope, ENVELOPE_MESSAGE_KEY)?;
    let message: Value = serde_json::from_str(inner)?;

    decode_message(&message)
}

/// Decode an already unwrapped notification message
pub fn decode_message(message: &Value) -> Result<LifecycleEvent, DecodeError> {
    let raw_event_type = require_str(message, "event_type")?;
    let event_type = EventType::parse(raw_event_type)
        .ok_or_else(|| DecodeError::MalformedEventType(raw_event_type.to_string()))?;

    let raw_timestamp = require_str(message, "timestamp")?;
    let timestamp = NaiveDateTime::parse_from_str(raw_timestamp, TIMESTAMP_FORMAT)
        .map_err(|_| DecodeError::InvalidTimestamp(raw_timestamp.to_string()))?;

    let data = require(require(message, "payload")?, OBJECT_DATA_KEY)?;
    let node_id = require_str(data, "uuid")?.to_string();
    let node_name = nullable_str(data, "name")?;
    let provision_state = nullable_str(data, "provision_state")?;

    // error notifications must say where the node was headed
    if event_type.phase == Phase::Error {
        require(data, "target_provision_state")?;
    }
    let target_provision_state = optional_str(data, "target_provision_state")?;

    Ok(LifecycleEvent {
        node_id,
        node_name,
        event_type,
        timestamp,
        provision_state,
        target_provision_state,
    })
}

fn require<'a>(value: &'a Value, key: &'static str) -> Result<&'a Value, DecodeError> {
    value.get(key).ok_or(DecodeError::MissingField(key))
}

fn require_str<'a>(value: &'a Value, key: &'static str) -> Result<&'a str, DecodeError> {
    require(value, key)?
        .as_str()
        .ok_or_else(|| DecodeError::InvalidField {
            field: key,
            reason: "expected a string".to_string(),
        })
}

/// The key must be present, but its value may be `null`
fn nullable_str(value: &Value, key: &'static str) -> Result<Option<String>, DecodeError> {
    require(value, key)?;
    optional_str(value, key)
}

/// Missing and `null` are both treated as absent
fn optional_str(value: &Value, key: &'static str) -> Result<Option<String>, DecodeError> {
    match value.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(DecodeError::InvalidField {
            field: key,
            reason: format!("expected a string or null, got {other}"),
        }),
    }
}
