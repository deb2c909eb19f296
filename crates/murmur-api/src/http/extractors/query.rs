//! Query parameter extractors for list endpoints.

use serde::Deserialize;

/// Query parameters for the message list endpoint.
#[derive(Debug, Deserialize, Default)]
pub struct MessageListQuery {
    /// Return only the most recent N messages. Absent returns the full log.
    pub limit: Option<u32>,
}
