//! Connection driver: runs an [`RpcClient`] over an async byte stream.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::RpcClient;
use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::transport::framing::write_line;

/// Size of a single read from the stream.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Resolve the default socket path.
///
/// Resolution order:
/// 1. `$XDG_RUNTIME_DIR/jrpc-stream.sock` (Linux standard)
/// 2. `<user cache dir>/jrpc-stream.sock` (e.g. `~/Library/Caches` on macOS)
/// 3. `/tmp/jrpc-stream.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join("jrpc-stream.sock");
    }

    if let Some(cache_dir) = dirs::cache_dir() {
        return cache_dir.join("jrpc-stream.sock");
    }

    PathBuf::from("/tmp/jrpc-stream.sock")
}

/// A client bound to a live duplex stream.
///
/// Two background tasks drive the stream: a writer draining the client's
/// outbound queue (one newline-terminated message per entry) and a reader
/// feeding every received chunk to [`RpcClient::on_bytes_received`]. When
/// the peer closes the stream, outstanding calls settle with
/// [`ClientError::Abandoned`].
///
/// There is no timeout on calls. Wrap them in `tokio::time::timeout` if needed.
pub struct Connection {
    client: Arc<Mutex<RpcClient>>,
    reader: JoinHandle<()>,
    writer: Option<JoinHandle<()>>,
}

impl Connection {
    /// Start driving `stream`. Must be called inside a tokio runtime.
    pub fn new<S>(stream: S, config: ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = unbounded_channel();
        let client = Arc::new(Mutex::new(RpcClient::new(config).with_writer(tx)));

        let writer = tokio::spawn(write_loop(write_half, rx));
        let reader = tokio::spawn(read_loop(read_half, Arc::clone(&client)));

        Self {
            client,
            reader,
            writer: Some(writer),
        }
    }

    /// Connect to a Unix domain socket at `socket_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the socket does not exist, the
    /// connection is refused, or permission is denied.
    pub async fn connect(socket_path: &Path, config: ClientConfig) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path).await?;
        info!("Connected to {}", socket_path.display());
        Ok(Self::new(stream, config))
    }

    /// Place a call and wait for its result.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        let response = self.lock().call(method, params)?;
        response.await
    }

    /// Send a notification. Nothing is awaited beyond queueing the message.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ClientError> {
        let settled = self.lock().notify(method, params)?;
        settled.await;
        Ok(())
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_len(&self) -> usize {
        self.lock().pending_len()
    }

    /// Stop reading, abandon pending calls, and flush queued messages.
    pub async fn shutdown(mut self) {
        self.reader.abort();
        if let Err(e) = (&mut self.reader).await {
            if !e.is_cancelled() {
                debug!("Reader task ended abnormally: {}", e);
            }
        }

        {
            let mut client = self.lock();
            client.abandon_pending();
            client.clear_writer();
        }

        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                warn!("Writer task ended abnormally: {}", e);
            }
        }
        debug!("Connection shut down");
    }

    fn lock(&self) -> MutexGuard<'_, RpcClient> {
        lock(&self.client)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // The writer exits on its own once the client and its queue are gone.
        self.reader.abort();
    }
}

fn lock(client: &Mutex<RpcClient>) -> MutexGuard<'_, RpcClient> {
    client.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn write_loop<S>(mut write_half: WriteHalf<S>, mut rx: UnboundedReceiver<String>)
where
    S: AsyncWrite,
{
    while let Some(message) = rx.recv().await {
        if let Err(e) = write_line(&mut write_half, &message).await {
            error!("Failed to send message: {:#}", e);
            return;
        }
    }
    if let Err(e) = write_half.shutdown().await {
        debug!("Failed to shut down write half: {}", e);
    }
}

async fn read_loop<S>(mut read_half: ReadHalf<S>, client: Arc<Mutex<RpcClient>>)
where
    S: AsyncRead,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => {
                info!("Peer closed the stream");
                break;
            }
            Ok(n) => feed(&client, &buf[..n]),
            Err(e) => {
                error!("Failed to read from peer: {}", e);
                break;
            }
        }
    }
    lock(&client).abandon_pending();
}

fn feed(client: &Mutex<RpcClient>, chunk: &[u8]) {
    if let Err(e) = lock(client).on_bytes_received(chunk) {
        warn!("Dropped inbound chunk: {}", e);
    }
}
