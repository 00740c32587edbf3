//! Routes classified inbound documents to the pending-call table.

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::ErrorCode;
use crate::message::{call_id, classify, ErrorResponse, Inbound};
use crate::pending::PendingCalls;

/// What happened to one inbound document.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A pending call was fulfilled.
    Resolved { id: u64 },
    /// A pending call was failed with the peer's error payload.
    Rejected { id: u64, code: i64 },
    /// A reply whose id has no pending call.
    Unmatched { id: Value },
    /// The peer sent a request or notification; clients do not serve them.
    IgnoredCall { method: String },
    /// The peer sent a batch; not supported.
    IgnoredBatch { len: usize },
    /// Neither reply nor call. `reply` is the INVALID_REQUEST answer,
    /// `replied` whether it was written back to the peer.
    Unrecognized { reply: ErrorResponse, replied: bool },
    /// Bytes that could not be decoded as JSON.
    DecodeFailed { reason: String },
}

/// Classify `value` and apply it to `table`.
///
/// Never panics and never touches entries other than the one addressed.
pub fn dispatch(table: &mut PendingCalls, value: Value) -> DispatchOutcome {
    route(table, classify(value))
}

/// Apply an already classified document to `table`.
pub fn route(table: &mut PendingCalls, inbound: Inbound) -> DispatchOutcome {
    match inbound {
        Inbound::Error(response) => {
            let code = response.error.code;
            match call_id(&response.id).map(|id| (id, table.reject(id, response.error))) {
                Some((id, Ok(()))) => {
                    debug!(id, code, "rejected pending call");
                    DispatchOutcome::Rejected { id, code }
                }
                _ => {
                    warn!("Error response for unknown request {}: code {}", response.id, code);
                    DispatchOutcome::Unmatched { id: response.id }
                }
            }
        }
        Inbound::Response(response) => {
            match call_id(&response.id).map(|id| (id, table.resolve(id, response.result))) {
                Some((id, Ok(()))) => {
                    debug!(id, "resolved pending call");
                    DispatchOutcome::Resolved { id }
                }
                _ => {
                    warn!("Response for unknown request {}", response.id);
                    DispatchOutcome::Unmatched { id: response.id }
                }
            }
        }
        Inbound::Call { method, id } => {
            debug!(method = %method, id = ?id, "ignoring inbound call");
            DispatchOutcome::IgnoredCall { method }
        }
        Inbound::Batch(len) => {
            warn!(len, "ignoring inbound batch");
            DispatchOutcome::IgnoredBatch { len }
        }
        Inbound::Unrecognized(value) => {
            warn!("Unrecognized inbound message: {}", value);
            DispatchOutcome::Unrecognized {
                reply: ErrorResponse::unaddressed(ErrorCode::InvalidRequest),
                replied: false,
            }
        }
    }
}
