//! The JSON-RPC client engine.
//!
//! [`RpcClient`] owns all per-connection state: the id counter, the
//! pending-call table, the stream decoder and the injected outbound writer.
//! It never touches a socket. The embedding transport hands it a writer and
//! feeds it inbound bytes through [`RpcClient::on_bytes_received`].
//!
//! # Usage
//!
//! ```ignore
//! use jrpc_stream::{ClientConfig, RpcClient};
//! use serde_json::json;
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let mut client = RpcClient::new(ClientConfig::default()).with_writer(tx);
//!
//! let reply = client.call("echo_params", Some(json!([1, 2])))?;
//! // rx now holds {"jsonrpc":"2.0","method":"echo_params","params":[1,2],"id":1}
//!
//! client.on_bytes_received(br#"{"jsonrpc":"2.0","result":[1,2],"id":1}"#)?;
//! assert_eq!(reply.await?, json!([1, 2]));
//! ```

use std::future::Ready;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::builder::CallBuilder;
use crate::config::ClientConfig;
use crate::decoder::{Decoded, StreamDecoder};
use crate::dispatcher::{dispatch, DispatchOutcome};
use crate::errors::{ClientError, ErrorCode};
use crate::message::ErrorResponse;
use crate::pending::{PendingCalls, ResponseFuture};

/// The "write bytes out" capability supplied by the embedding transport.
///
/// Receives one serialized JSON document per call, without a delimiter.
pub trait Outbound: Send {
    fn write_out(&mut self, message: String) -> Result<(), ClientError>;
}

impl Outbound for UnboundedSender<String> {
    fn write_out(&mut self, message: String) -> Result<(), ClientError> {
        self.send(message)
            .map_err(|_| ClientError::Transport("outbound channel closed".to_string()))
    }
}

/// JSON-RPC 2.0 client state for one duplex stream.
pub struct RpcClient {
    config: ClientConfig,
    builder: CallBuilder,
    pending: PendingCalls,
    decoder: StreamDecoder,
    writer: Option<Box<dyn Outbound>>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("config", &self.config)
            .field("pending", &self.pending.ids())
            .field("buffered", &self.decoder.buffered_len())
            .field("writer", &self.writer.is_some())
            .finish()
    }
}

impl RpcClient {
    /// Create a client with no writer installed.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            builder: CallBuilder::new(),
            pending: PendingCalls::new(),
            decoder: StreamDecoder::new(),
            writer: None,
        }
    }

    /// Builder-style variant of [`RpcClient::set_writer`].
    pub fn with_writer(mut self, writer: impl Outbound + 'static) -> Self {
        self.set_writer(writer);
        self
    }

    /// Install the outbound writer, replacing any previous one.
    pub fn set_writer(&mut self, writer: impl Outbound + 'static) {
        self.writer = Some(Box::new(writer));
    }

    /// Remove the outbound writer. Later calls fail with `WriterNotConfigured`.
    pub fn clear_writer(&mut self) {
        self.writer = None;
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Ids of calls still waiting for a reply, ascending.
    pub fn pending_ids(&self) -> Vec<u64> {
        self.pending.ids()
    }

    /// Place a call and return the future of its result.
    ///
    /// The pending entry is registered before the request is handed to the
    /// writer, so a reply can never race ahead of its entry.
    ///
    /// # Errors
    ///
    /// - [`ClientError::WriterNotConfigured`] if no writer is installed
    /// - [`ClientError::InvalidParams`] if `params` is neither array nor object
    /// - any error from the writer; the pending entry is removed again
    pub fn call(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<ResponseFuture, ClientError> {
        if self.writer.is_none() {
            return Err(ClientError::WriterNotConfigured);
        }

        let (request, future) = self.builder.request(&mut self.pending, method, params)?;
        debug!(id = request.id, method, "sending request");

        if let Err(e) = self.send(&request) {
            self.pending.forget(request.id);
            return Err(e);
        }
        Ok(future)
    }

    /// Send a notification. The returned future is already settled.
    ///
    /// # Errors
    ///
    /// Same as [`RpcClient::call`], minus anything pending-table related.
    pub fn notify(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Ready<()>, ClientError> {
        if self.writer.is_none() {
            return Err(ClientError::WriterNotConfigured);
        }

        let (notification, settled) = self.builder.notification(method, params)?;
        debug!(method, "sending notification");
        self.send(&notification)?;
        Ok(settled)
    }

    /// Process a chunk of inbound bytes.
    ///
    /// Every complete document in the chunk (plus any buffered partial one it
    /// completes) is decoded, classified and routed in order. Decode failures,
    /// unmatched replies and unrecognized documents are logged and reported
    /// as outcomes; they never affect other pending calls.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InputOverflow`] when the buffered partial plus
    /// `chunk` exceeds `max_buffered_bytes`. The chunk is dropped, the decoder
    /// buffer cleared, and a PARSE_ERROR response is written to the peer.
    pub fn on_bytes_received(
        &mut self,
        chunk: impl AsRef<[u8]>,
    ) -> Result<Vec<DispatchOutcome>, ClientError> {
        let chunk = chunk.as_ref();
        let buffered = self.decoder.buffered_len() + chunk.len();
        if buffered > self.config.max_buffered_bytes {
            warn!(
                "Inbound data too large: {} bytes (max {})",
                buffered, self.config.max_buffered_bytes
            );
            self.decoder.clear();
            self.reply(&ErrorResponse::unaddressed(ErrorCode::ParseError));
            return Err(ClientError::InputOverflow {
                buffered,
                limit: self.config.max_buffered_bytes,
            });
        }

        let mut outcomes = Vec::new();
        for decoded in self.decoder.feed(chunk) {
            let outcome = match decoded {
                Decoded::Value(value) => dispatch(&mut self.pending, value),
                Decoded::Error(e) => {
                    warn!("Failed to decode inbound data: {}", e);
                    DispatchOutcome::DecodeFailed {
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        if self.config.reply_to_unrecognized {
            for outcome in &mut outcomes {
                if let DispatchOutcome::Unrecognized { reply, replied } = outcome {
                    *replied = self.reply(reply);
                }
            }
        }

        Ok(outcomes)
    }

    /// Drop every pending call; their futures settle with `Abandoned`.
    pub fn abandon_pending(&mut self) {
        if !self.pending.is_empty() {
            debug!(pending = self.pending.len(), "abandoning pending calls");
        }
        self.pending.clear();
    }

    fn send<T: Serialize>(&mut self, message: &T) -> Result<(), ClientError> {
        let serialized = serde_json::to_string(message)?;
        let writer = self.writer.as_mut().ok_or(ClientError::WriterNotConfigured)?;
        writer.write_out(serialized)
    }

    /// Best-effort write of a client-originated error response.
    fn reply(&mut self, response: &ErrorResponse) -> bool {
        match self.send(response) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send error response {}: {}", response.error.code, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn client_with(config: ClientConfig) -> (RpcClient, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        (RpcClient::new(config).with_writer(tx), rx)
    }

    fn client() -> (RpcClient, UnboundedReceiver<String>) {
        client_with(ClientConfig::default())
    }

    fn sent(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(serde_json::from_str(&message).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_call_roundtrip() {
        let (mut client, mut rx) = client();
        let fut = client.call("m", Some(json!([1, 2]))).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            r#"{"jsonrpc":"2.0","method":"m","params":[1,2],"id":1}"#
        );

        let outcomes = client
            .on_bytes_received(r#"{"jsonrpc":"2.0","result":[1,2],"id":1}"#)
            .unwrap();
        assert_eq!(outcomes, vec![DispatchOutcome::Resolved { id: 1 }]);
        assert_eq!(fut.await.unwrap(), json!([1, 2]));
        assert_eq!(client.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_call_rejected_by_error_reply() {
        let (mut client, _rx) = client();
        let fut = client.call("m", None).unwrap();

        client
            .on_bytes_received(
                r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found."},"id":1}"#,
            )
            .unwrap();

        match fut.await {
            Err(ClientError::Remote(payload)) => {
                assert_eq!(payload.code, -32601);
                assert_eq!(payload.message, "Method not found.");
                assert_eq!(payload.data, None);
            }
            other => panic!("Expected Remote error, got {:?}", other),
        }
    }

    #[test]
    fn test_call_without_writer_is_configuration_error() {
        let mut client = RpcClient::new(ClientConfig::default());
        assert!(matches!(
            client.call("m", None),
            Err(ClientError::WriterNotConfigured)
        ));
        assert!(matches!(
            client.notify("m", None),
            Err(ClientError::WriterNotConfigured)
        ));
        assert_eq!(client.pending_len(), 0);
    }

    #[test]
    fn test_writer_failure_unregisters_call() {
        let (tx, rx) = unbounded_channel::<String>();
        drop(rx);
        let mut client = RpcClient::new(ClientConfig::default()).with_writer(tx);

        assert!(matches!(client.call("m", None), Err(ClientError::Transport(_))));
        assert_eq!(client.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_notify_is_settled_and_registers_nothing() {
        let (mut client, mut rx) = client();
        let _keep = client.call("m", None).unwrap();
        let before = client.pending_len();

        client.notify("ping", None).unwrap().await;

        assert_eq!(client.pending_len(), before);
        let messages = sent(&mut rx);
        assert_eq!(messages[1], json!({"jsonrpc": "2.0", "method": "ping"}));
    }

    #[test]
    fn test_unrecognized_reply_disabled_by_default() {
        let (mut client, mut rx) = client();
        let outcomes = client.on_bytes_received(r#"{"jsonrpc":"2.0"}"#).unwrap();
        assert!(matches!(
            outcomes[0],
            DispatchOutcome::Unrecognized { replied: false, .. }
        ));
        assert!(sent(&mut rx).is_empty());
    }

    #[test]
    fn test_unrecognized_reply_when_enabled() {
        let (mut client, mut rx) = client_with(ClientConfig {
            reply_to_unrecognized: true,
            ..ClientConfig::default()
        });
        let outcomes = client.on_bytes_received(r#"{"jsonrpc":"2.0"}"#).unwrap();
        assert!(matches!(
            outcomes[0],
            DispatchOutcome::Unrecognized { replied: true, .. }
        ));
        assert_eq!(
            sent(&mut rx),
            vec![json!({
                "jsonrpc": "2.0",
                "error": {
                    "code": -32600,
                    "message": "Invalid Request. The JSON sent is not a valid Request object."
                },
                "id": null
            })]
        );
    }

    #[tokio::test]
    async fn test_overflow_sends_parse_error_and_keeps_pending() {
        let (mut client, mut rx) = client_with(ClientConfig {
            max_buffered_bytes: 32,
            ..ClientConfig::default()
        });
        let fut = client.call("m", None).unwrap();
        sent(&mut rx);

        let err = client.on_bytes_received([b' '; 33]).unwrap_err();
        assert!(matches!(
            err,
            ClientError::InputOverflow {
                buffered: 33,
                limit: 32
            }
        ));
        let replies = sent(&mut rx);
        assert_eq!(replies[0]["error"]["code"], json!(-32700));
        assert_eq!(replies[0]["id"], Value::Null);

        client.on_bytes_received(r#"{"result":0,"id":1}"#).unwrap();
        assert_eq!(fut.await.unwrap(), json!(0));
    }

    #[tokio::test]
    async fn test_drop_abandons_outstanding_calls() {
        let (mut client, _rx) = client();
        let fut = client.call("m", None).unwrap();
        drop(client);
        assert!(matches!(fut.await, Err(ClientError::Abandoned)));
    }
}
