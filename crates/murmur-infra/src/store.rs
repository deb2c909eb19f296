//! Runtime selection between the durable and ephemeral message stores.

use chrono::{DateTime, Utc};
use murmur_core::repository::memory::InMemoryMessageStore;
use murmur_core::repository::message::MessageStore;
use murmur_types::chat::ChatMessage;
use murmur_types::error::RepositoryError;

use crate::sqlite::message::SqliteMessageStore;

/// The message store the server runs with.
pub enum RelayStore {
    /// `murmur.db` in the data directory.
    Sqlite(SqliteMessageStore),
    /// Process memory only (`serve --ephemeral`).
    Memory(InMemoryMessageStore),
}

impl RelayStore {
    pub fn is_durable(&self) -> bool {
        matches!(self, RelayStore::Sqlite(_))
    }
}

impl MessageStore for RelayStore {
    async fn append(&self, author: &str, body: &str) -> Result<DateTime<Utc>, RepositoryError> {
        match self {
            RelayStore::Sqlite(store) => store.append(author, body).await,
            RelayStore::Memory(store) => store.append(author, body).await,
        }
    }

    async fn read_recent(&self, limit: u32) -> Result<Vec<ChatMessage>, RepositoryError> {
        match self {
            RelayStore::Sqlite(store) => store.read_recent(limit).await,
            RelayStore::Memory(store) => store.read_recent(limit).await,
        }
    }

    async fn read_all(&self) -> Result<Vec<ChatMessage>, RepositoryError> {
        match self {
            RelayStore::Sqlite(store) => store.read_all().await,
            RelayStore::Memory(store) => store.read_all().await,
        }
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        match self {
            RelayStore::Sqlite(store) => store.count().await,
            RelayStore::Memory(store) => store.count().await,
        }
    }
}
