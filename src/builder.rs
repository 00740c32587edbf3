//! Call builder: turns a method and params into an outbound message.

use std::future::{ready, Ready};

use serde_json::Value;

use crate::errors::{ClientError, ErrorCode};
use crate::message::{Notification, Request, JSONRPC_VERSION};
use crate::pending::{PendingCalls, ResponseFuture};

/// Allocates request ids and builds outbound messages.
///
/// Ids start at 1 and increase by one per request. Notifications consume no
/// id.
#[derive(Debug)]
pub struct CallBuilder {
    last_id: u64,
}

impl Default for CallBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CallBuilder {
    pub fn new() -> Self {
        Self { last_id: 0 }
    }

    /// The id the next request will get.
    pub fn peek_next_id(&self) -> u64 {
        self.last_id + 1
    }

    /// Build a request and register its pending entry in `table`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidParams`] if `params` is neither array nor object
    ///   (no id is consumed)
    /// - [`ClientError::DuplicateId`] if the table already holds the new id
    pub fn request(
        &mut self,
        table: &mut PendingCalls,
        method: &str,
        params: Option<Value>,
    ) -> Result<(Request, ResponseFuture), ClientError> {
        check_params(params.as_ref())?;

        let id = self.last_id + 1;
        let future = table.register(id)?;
        self.last_id = id;

        let request = Request {
            jsonrpc: JSONRPC_VERSION,
            method: method.to_string(),
            params,
            id,
        };
        Ok((request, future))
    }

    /// Build a notification. The returned future is already settled.
    pub fn notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(Notification, Ready<()>), ClientError> {
        check_params(params.as_ref())?;

        let notification = Notification {
            jsonrpc: JSONRPC_VERSION,
            method: method.to_string(),
            params,
        };
        Ok((notification, ready(())))
    }
}

fn check_params(params: Option<&Value>) -> Result<(), ClientError> {
    match params {
        None | Some(Value::Array(_)) | Some(Value::Object(_)) => Ok(()),
        Some(_) => Err(ClientError::InvalidParams(ErrorCode::InvalidParams.payload())),
    }
}
