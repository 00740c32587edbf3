//! jrpc-stream demo client.
//!
//! Connects to a JSON-RPC 2.0 peer over a Unix domain socket and places a few
//! `echo_params` calls, printing each result or error.
//!
//! Socket path resolution: first argument, then `$JRPC_SOCKET`, then
//! [`default_socket_path`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jrpc_stream::transport::{default_socket_path, Connection};
use jrpc_stream::ClientConfig;

fn socket_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("JRPC_SOCKET"))
        .map(PathBuf::from)
        .unwrap_or_else(default_socket_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "jrpc_stream=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    tracing::info!("Starting jrpc-stream v{}", env!("CARGO_PKG_VERSION"));

    let path = socket_path();
    let conn = Connection::connect(&path, ClientConfig::from_env())
        .await
        .with_context(|| format!("Server not active at {}", path.display()))?;

    let calls = [
        ("echo_params", Some(json!([1, 2, 3, "vier", 5.1]))),
        ("echo_params", Some(json!({"bla": "frupp"}))),
        ("notify", Some(json!(["willi"]))),
    ];

    for (n, (method, params)) in calls.into_iter().enumerate() {
        match conn.call(method, params).await {
            Ok(result) => println!("{}: {}", n + 1, result),
            Err(e) => println!("{}: {}", n + 1, e),
        }
    }

    conn.notify("bye", None).await?;
    conn.shutdown().await;
    Ok(())
}
