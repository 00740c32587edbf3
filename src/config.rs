//! Client configuration.
//!
//! Settings can be built in code, deserialized from any serde source, or read
//! from the environment with [`ClientConfig::from_env`]:
//!
//! - `JRPC_REPLY_UNRECOGNIZED` - `1`, `true` or `yes` enables replies
//! - `JRPC_MAX_BUFFERED_BYTES` - decoder buffer cap in bytes

use serde::Deserialize;
use tracing::warn;

/// Default decoder buffer cap (100MB) to prevent OOM from a runaway peer.
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 100 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Answer unrecognized inbound documents with an INVALID_REQUEST error.
    ///
    /// Off by default: a pure client has no business replying to its peer.
    pub reply_to_unrecognized: bool,
    /// Upper bound on bytes held by the stream decoder.
    pub max_buffered_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reply_to_unrecognized: false,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `JRPC_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup("JRPC_REPLY_UNRECOGNIZED") {
            config.reply_to_unrecognized =
                matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        if let Some(value) = lookup("JRPC_MAX_BUFFERED_BYTES") {
            match value.trim().parse() {
                Ok(limit) => config.max_buffered_bytes = limit,
                Err(e) => warn!("Ignoring invalid JRPC_MAX_BUFFERED_BYTES {:?}: {}", value, e),
            }
        }

        config
    }
}
