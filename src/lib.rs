//! jrpc-stream: a JSON-RPC 2.0 client engine for duplex byte streams.
//!
//! - `errors` - error catalog and client error types
//! - `message` - wire shapes and inbound classification
//! - `pending` - pending-call table and response futures
//! - `builder` - request/notification construction and id allocation
//! - `decoder` - incremental decoder for concatenated JSON documents
//! - `dispatcher` - routing of classified documents to pending calls
//! - `client` - the engine tying the above together
//! - `config` - client settings
//! - `transport` - newline framing and a tokio connection driver
//!
//! # Example
//!
//! ```ignore
//! use jrpc_stream::{ClientConfig, RpcClient};
//!
//! let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//! let mut client = RpcClient::new(ClientConfig::default()).with_writer(tx);
//! let reply = client.call("system.ping", None)?;
//! // ... hand `rx` to the transport, feed inbound bytes:
//! client.on_bytes_received(r#"{"jsonrpc":"2.0","result":"pong","id":1}"#)?;
//! let pong = reply.await?;
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod decoder;
pub mod dispatcher;
pub mod errors;
pub mod message;
pub mod pending;
pub mod transport;

pub use client::{Outbound, RpcClient};
pub use config::ClientConfig;
pub use dispatcher::DispatchOutcome;
pub use errors::{ClientError, ErrorCode, ErrorPayload};
pub use pending::ResponseFuture;
