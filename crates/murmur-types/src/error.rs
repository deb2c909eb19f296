use thiserror::Error;

use crate::session::ConnectionId;

/// Errors raised while processing a client intent.
///
/// None of these are fatal to the process. They are reported, at most, to
/// the originating connection.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("author is empty")]
    EmptyAuthor,

    #[error("message body is empty")]
    EmptyMessage,

    #[error("message body is {len} characters, limit is {max}")]
    MessageTooLong { len: usize, max: usize },

    #[error("message store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    #[error("connection {0} is already registered")]
    DuplicateConnection(ConnectionId),
}

impl RelayError {
    /// Machine-readable code carried by the `error` wire event.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::EmptyAuthor => "EMPTY_AUTHOR",
            RelayError::EmptyMessage => "EMPTY_MESSAGE",
            RelayError::MessageTooLong { .. } => "MESSAGE_TOO_LONG",
            RelayError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            RelayError::UnknownConnection(_) => "UNKNOWN_CONNECTION",
            RelayError::DuplicateConnection(_) => "DUPLICATE_CONNECTION",
        }
    }

    /// Whether the failure came from client input rather than the server.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RelayError::EmptyAuthor | RelayError::EmptyMessage | RelayError::MessageTooLong { .. }
        )
    }
}

/// Errors from message store operations (used by the trait in murmur-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),
}

impl RepositoryError {
    /// Whether retrying the same operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Connection)
    }
}

impl From<RepositoryError> for RelayError {
    fn from(e: RepositoryError) -> Self {
        RelayError::StoreUnavailable(e.to_string())
    }
}
