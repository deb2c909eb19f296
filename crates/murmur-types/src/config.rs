//! Relay configuration types.
//!
//! `RelayConfig` represents `config.toml` in the data directory. Every field
//! has a default, so an empty or missing file yields a working server.

use serde::{Deserialize, Serialize};

/// Number of messages replayed by a `requestHistory` intent.
pub const HISTORY_LIMIT: u32 = 50;

/// Top-level configuration for the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Capacity of each connection's outbound event queue. A connection whose
    /// queue is full when an event is fanned out is disconnected.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Longest accepted message body, in characters.
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,

    /// Attempts made to append a message before reporting the store as
    /// unavailable.
    #[serde(default = "default_store_retry_attempts")]
    pub store_retry_attempts: u32,

    /// Delay before the first append retry; doubled for each further retry.
    #[serde(default = "default_store_retry_backoff_ms")]
    pub store_retry_backoff_ms: u64,

    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_max_body_chars() -> usize {
    500
}

fn default_store_retry_attempts() -> u32 {
    3
}

fn default_store_retry_backoff_ms() -> u64 {
    50
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            outbound_buffer: default_outbound_buffer(),
            max_body_chars: default_max_body_chars(),
            store_retry_attempts: default_store_retry_attempts(),
            store_retry_backoff_ms: default_store_retry_backoff_ms(),
            cors_origins: Vec::new(),
        }
    }
}
