//! Message store trait definition.
//!
//! Defines the storage interface for the append-only chat log. The
//! infrastructure layer (murmur-infra) implements this trait with SQLite
//! persistence; [`super::memory::InMemoryMessageStore`] backs ephemeral mode.

use chrono::{DateTime, Utc};
use murmur_types::chat::ChatMessage;
use murmur_types::error::RepositoryError;

/// Repository trait for the chat message log.
///
/// Implementations assign `created_at` at append time and must keep it
/// non-decreasing across appends. Reads return messages in append order,
/// which is ascending by `created_at`.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait MessageStore: Send + Sync {
    /// Append a message and return its assigned timestamp.
    fn append(
        &self,
        author: &str,
        body: &str,
    ) -> impl std::future::Future<Output = Result<DateTime<Utc>, RepositoryError>> + Send;

    /// Read the most recent `limit` messages, oldest first.
    fn read_recent(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Read the whole log, oldest first.
    fn read_all(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Number of messages in the log.
    fn count(&self) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
