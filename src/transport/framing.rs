//! Newline framing for outbound messages.
//!
//! Each serialized message is followed by a single `\n`. Inbound data is not
//! framed here: the stream decoder accepts both newline-separated and
//! back-to-back documents.

use anyhow::{Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Write `body` followed by a newline, then flush.
///
/// # Errors
///
/// Returns an error if the write or flush fails.
///
/// # Example
///
/// ```ignore
/// let request = serde_json::to_string(&request)?;
/// write_line(&mut writer, &request).await?;
/// ```
pub async fn write_line<W>(writer: &mut W, body: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(body.as_bytes())
        .await
        .context("Failed to write message body")?;

    writer
        .write_all(b"\n")
        .await
        .context("Failed to write message delimiter")?;

    writer.flush().await.context("Failed to flush message")?;

    Ok(())
}
