//! Error catalog and client error types.
//!
//! The catalog holds the five standard JSON-RPC 2.0 error kinds. The client
//! uses it when it has to synthesize an error object of its own (a reply to
//! unrecognized input, a parse error, or a local params check).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard JSON-RPC 2.0 error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
}

impl ErrorCode {
    /// Numeric code as sent on the wire.
    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
        }
    }

    /// Human-readable message paired with the code.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => {
                "Invalid JSON was received by the server. An error occurred on the server while parsing the JSON text."
            }
            ErrorCode::InvalidRequest => {
                "Invalid Request. The JSON sent is not a valid Request object."
            }
            ErrorCode::MethodNotFound => {
                "Method not found. The method does not exist / is not available."
            }
            ErrorCode::InvalidParams => "Invalid params. Invalid method parameter(s).",
            ErrorCode::InternalError => "Internal error. Internal JSON-RPC error.",
        }
    }

    /// Look up a catalog entry by its numeric code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -32700 => Some(ErrorCode::ParseError),
            -32600 => Some(ErrorCode::InvalidRequest),
            -32601 => Some(ErrorCode::MethodNotFound),
            -32602 => Some(ErrorCode::InvalidParams),
            -32603 => Some(ErrorCode::InternalError),
            _ => None,
        }
    }

    /// Build the wire error object for this kind (no `data`).
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code(),
            message: self.message().to_string(),
            data: None,
        }
    }
}

/// The `error` member of a JSON-RPC error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorPayload {
    /// Read the `error` member of a reply.
    ///
    /// A member that is not `{code, message, data?}` still settles the call:
    /// it becomes an internal error carrying the raw member as `data`.
    pub fn from_member(member: serde_json::Value) -> Self {
        match serde_json::from_value(member.clone()) {
            Ok(payload) => payload,
            Err(_) => ErrorPayload {
                code: ErrorCode::InternalError.code(),
                message: "Malformed error object in response".to_string(),
                data: Some(member),
            },
        }
    }

    /// The catalog kind matching this payload's code, if it is a standard one.
    pub fn kind(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)
    }
}

/// Errors surfaced by the client and its transport.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No outbound writer was installed before a call was placed.
    #[error("Outbound writer not configured; install one before placing calls")]
    WriterNotConfigured,

    /// Params were neither a JSON array nor a JSON object.
    #[error("Invalid params: {0}")]
    InvalidParams(ErrorPayload),

    /// The peer answered with a JSON-RPC error response.
    #[error("Server error {}: {}", .0.code, .0.message)]
    Remote(ErrorPayload),

    /// The client went away before the call was settled.
    #[error("Call abandoned before a response arrived")]
    Abandoned,

    /// An id was registered while a call with the same id was still pending.
    #[error("Call id {0} is already pending")]
    DuplicateId(u64),

    /// Inbound data exceeded the decoder's buffer limit.
    #[error("Inbound data of {buffered} bytes exceeds limit of {limit} bytes")]
    InputOverflow { buffered: usize, limit: usize },

    /// A message could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The outbound side of the transport is gone.
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// The error payload carried by a remote rejection, if any.
    pub fn payload(&self) -> Option<&ErrorPayload> {
        match self {
            ClientError::Remote(payload) | ClientError::InvalidParams(payload) => Some(payload),
            _ => None,
        }
    }
}
