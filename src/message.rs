//! JSON-RPC 2.0 message shapes and inbound classification.
//!
//! Outbound messages (`Request`, `Notification`) are plain serde structs whose
//! field order matches the wire order: `jsonrpc`, `method`, `params`, `id`.
//! Inbound values are tagged into [`Inbound`] by [`classify`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ErrorCode, ErrorPayload};

/// Protocol version string carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// An outbound call expecting exactly one reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: u64,
}

/// An outbound message with no reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A success reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: Value,
    pub result: Value,
}

/// An error reply. Also used for the error objects this client synthesizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub jsonrpc: String,
    pub error: ErrorPayload,
    pub id: Value,
}

impl ErrorResponse {
    /// An error reply with `id: null` built from a catalog entry.
    pub fn unaddressed(kind: ErrorCode) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            error: kind.payload(),
            id: Value::Null,
        }
    }
}

/// A classified inbound document.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Carries a truthy `error` member.
    Error(ErrorResponse),
    /// Carries both `result` and `id` members.
    Response(Response),
    /// A request or notification sent by the peer. Not handled by a client.
    Call { method: String, id: Option<Value> },
    /// A top-level array.
    Batch(usize),
    /// Anything else.
    Unrecognized(Value),
}

/// Classify a decoded JSON value.
///
/// Decision order, first match wins:
/// 1. truthy `error` member → [`Inbound::Error`]
/// 2. `result` and `id` members both present → [`Inbound::Response`]
/// 3. string `method` member → [`Inbound::Call`]
/// 4. array → [`Inbound::Batch`]
/// 5. anything else → [`Inbound::Unrecognized`]
///
/// An `error` member that is not a well-formed error object still classifies
/// as [`Inbound::Error`]; see [`ErrorPayload::from_member`].
pub fn classify(value: Value) -> Inbound {
    let mut object = match value {
        Value::Object(object) => object,
        Value::Array(items) => return Inbound::Batch(items.len()),
        other => return Inbound::Unrecognized(other),
    };

    if object.get("error").is_some_and(is_truthy) {
        let error = object.remove("error").unwrap_or_default();
        return Inbound::Error(ErrorResponse {
            jsonrpc: version_of(&object),
            error: ErrorPayload::from_member(error),
            id: object.remove("id").unwrap_or_default(),
        });
    }

    // Presence, not truthiness: `"result": null` is still a response.
    if object.contains_key("result") && object.contains_key("id") {
        return Inbound::Response(Response {
            id: object.remove("id").unwrap_or_default(),
            result: object.remove("result").unwrap_or_default(),
        });
    }

    if let Some(Value::String(method)) = object.get("method") {
        return Inbound::Call {
            method: method.clone(),
            id: object.remove("id"),
        };
    }

    Inbound::Unrecognized(Value::Object(object))
}

/// Map an inbound `id` onto a pending-call key.
///
/// Non-negative integral numbers map directly, so `1.0` matches call 1.
/// Strings match only in canonical decimal form (`"7"`, not `"07"` or
/// `" 7"`), since peers occasionally echo ids back as strings. Anything else
/// has no key.
pub fn call_id(id: &Value) -> Option<u64> {
    match id {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.parse::<u64>().ok().filter(|id| id.to_string() == *s),
        _ => None,
    }
}

/// Loose truthiness: everything except `null`, `false`, `0` and `""`.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn version_of(object: &Map<String, Value>) -> String {
    object
        .get("jsonrpc")
        .and_then(Value::as_str)
        .unwrap_or(JSONRPC_VERSION)
        .to_string()
}
