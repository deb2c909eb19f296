//! Chat message domain type.
//!
//! A `ChatMessage` is the unit of the append-only message log. It is
//! immutable once the store has assigned its `created_at` timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted chat message.
///
/// `created_at` is assigned by the message store at append time and is
/// monotonically non-decreasing across appends. Ties are broken by append
/// order, which is also the order `read_recent` returns them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Declared display name of the sender (not verified).
    pub author: String,
    /// Message text as submitted.
    pub body: String,
    /// Server-assigned append timestamp.
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(author: impl Into<String>, body: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            author: author.into(),
            body: body.into(),
            created_at,
        }
    }
}
