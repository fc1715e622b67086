//! Wire payload handling
//!
//! Payloads are UTF-8 JSON objects. Outgoing payloads always carry `unitID`;
//! inbound payloads carry `dest`, either `"all"` or a unit identifier.

use serde_json::{Map, Value};
use thiserror::Error;

/// Key identifying the sending unit in outgoing payloads
pub const UNIT_ID_KEY: &str = "unitID";
/// Key naming the recipient of an inbound payload
pub const DEST_KEY: &str = "dest";
/// Destination value addressing every unit
pub const BROADCAST_DEST: &str = "all";

/// Structured payload exchanged with the broker
pub type Payload = Map<String, Value>;

/// Inbound payload decoding errors
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("Payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
    #[error("Payload has no `dest` field")]
    MissingDestination,
    #[error("Payload `dest` field is not a string")]
    InvalidDestination,
}

/// Outbound payload preparation errors
#[derive(Debug, Error, PartialEq)]
pub enum EncodeError {
    #[error("No unitID in payload and no identity configured")]
    MissingIdentity,
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Routing decision for an inbound payload
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Payload is for this unit
    Accept,
    /// Payload is addressed to another unit
    Reject { dest: String },
}

/// Decode raw bytes into a JSON object
pub fn decode_payload(raw: &[u8]) -> Result<Payload, DecodeError> {
    let text = std::str::from_utf8(raw)?;
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::NotAnObject(json_kind(&other))),
    }
}

/// Decide whether a decoded payload is addressed to `identity`
///
/// With no identity every payload is accepted. With an identity, `dest` must be
/// present and be a string; anything else is a malformed payload.
pub fn route_payload(identity: Option<&str>, payload: &Payload) -> Result<Delivery, DecodeError> {
    let Some(identity) = identity else {
        return Ok(Delivery::Accept);
    };

    let dest = payload
        .get(DEST_KEY)
        .ok_or(DecodeError::MissingDestination)?
        .as_str()
        .ok_or(DecodeError::InvalidDestination)?;

    if dest == BROADCAST_DEST || dest == identity {
        Ok(Delivery::Accept)
    } else {
        Ok(Delivery::Reject {
            dest: dest.to_string(),
        })
    }
}

/// Tag a payload with the unit identity and serialize it
///
/// An existing `unitID` is kept as is. A `null` one, or a missing one with no
/// identity to inject, is refused.
pub fn encode_payload(mut payload: Payload, identity: Option<&str>) -> Result<Vec<u8>, EncodeError> {
    if !payload.contains_key(UNIT_ID_KEY) {
        let id = identity.ok_or(EncodeError::MissingIdentity)?;
        payload.insert(UNIT_ID_KEY.to_string(), Value::String(id.to_string()));
    }

    if payload.get(UNIT_ID_KEY).map_or(true, Value::is_null) {
        return Err(EncodeError::MissingIdentity);
    }

    serde_json::to_vec(&payload).map_err(|e| EncodeError::Serialization(e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
