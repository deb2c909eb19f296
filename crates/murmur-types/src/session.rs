//! Connection and session types.
//!
//! A `Session` is the server-side state for one live transport connection.
//! Sessions are in-memory only and are lost on restart; clients re-register
//! by reconnecting.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of one transport connection.
///
/// UUIDv7, minted by the transport adapter when a connection is accepted.
/// Unique for the lifetime of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Mint a fresh connection ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Point-in-time view of one connected client.
///
/// `display_name` is `None` until the client declares one through a send or
/// typing intent. Display names are not unique across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub connection_id: ConnectionId,
    pub display_name: Option<String>,
    pub typing: bool,
}

impl Session {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            display_name: None,
            typing: false,
        }
    }
}
