//! Stream transport for the client engine.
//!
//! The engine in [`crate::client`] never touches I/O. This module supplies the
//! two capabilities it needs for a real byte stream:
//!
//! ```text
//! ┌─────────────────┐   newline-terminated JSON   ┌──────────────┐
//! │   Connection    │  ─────────────────────────► │              │
//! │  (RpcClient +   │                             │   JSON-RPC   │
//! │  reader/writer  │  ◄───────────────────────── │     peer     │
//! │     tasks)      │   raw chunks, any split     │              │
//! └─────────────────┘                             └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use jrpc_stream::transport::{default_socket_path, Connection};
//! use jrpc_stream::ClientConfig;
//! use serde_json::json;
//!
//! let conn = Connection::connect(&default_socket_path(), ClientConfig::from_env()).await?;
//! let echoed = conn.call("echo_params", Some(json!([1, 2, 3]))).await?;
//! ```

mod connection;
mod framing;

pub use connection::{default_socket_path, Connection};
pub use framing::write_line;
