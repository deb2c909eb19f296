//! SQLite message store implementation.
//!
//! Implements `MessageStore` from `murmur-core` using sqlx with split
//! read/write pools. Timestamps are stored as microseconds since the epoch
//! and clamped at insert time so they never go backwards, even if the wall
//! clock does.

use chrono::{DateTime, Utc};
use murmur_core::repository::message::MessageStore;
use murmur_types::chat::ChatMessage;
use murmur_types::error::RepositoryError;
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `MessageStore`.
#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: DatabasePool,
}

impl SqliteMessageStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn from_micros(micros: i64) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| RepositoryError::Query(format!("invalid timestamp: {micros}")))
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMessage, RepositoryError> {
    let author: String = row
        .try_get("author")
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    let body: String = row
        .try_get("body")
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    let created_at: i64 = row
        .try_get("created_at")
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

    Ok(ChatMessage::new(author, body, from_micros(created_at)?))
}

fn map_sqlx(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Connection
        }
        other => RepositoryError::Query(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// MessageStore impl
// ---------------------------------------------------------------------------

impl MessageStore for SqliteMessageStore {
    async fn append(&self, author: &str, body: &str) -> Result<DateTime<Utc>, RepositoryError> {
        let now = Utc::now().timestamp_micros();

        let created_at: i64 = sqlx::query_scalar(
            r#"INSERT INTO chat_messages (author, body, created_at)
               VALUES (?, ?, MAX(?, COALESCE((SELECT MAX(created_at) FROM chat_messages), 0)))
               RETURNING created_at"#,
        )
        .bind(author)
        .bind(body)
        .bind(now)
        .fetch_one(&self.pool.writer)
        .await
        .map_err(map_sqlx)?;

        from_micros(created_at)
    }

    async fn read_recent(&self, limit: u32) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT author, body, created_at FROM (
                   SELECT id, author, body, created_at FROM chat_messages
                   ORDER BY id DESC
                   LIMIT ?
               )
               ORDER BY id ASC"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx)?;

        rows.iter().map(message_from_row).collect()
    }

    async fn read_all(&self) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query("SELECT author, body, created_at FROM chat_messages ORDER BY id ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(map_sqlx)?;

        rows.iter().map(message_from_row).collect()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(map_sqlx)?;
        Ok(count as u64)
    }
}
