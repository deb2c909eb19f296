//! In-process message store.
//!
//! Keeps the log in a `Vec` behind an async lock. Used by `serve --ephemeral`
//! and by engine tests; contents are lost when the process exits.

use chrono::{DateTime, Utc};
use murmur_types::chat::ChatMessage;
use murmur_types::error::RepositoryError;
use tokio::sync::RwLock;

use super::message::MessageStore;

#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<ChatMessage>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for InMemoryMessageStore {
    async fn append(&self, author: &str, body: &str) -> Result<DateTime<Utc>, RepositoryError> {
        let mut messages = self.messages.write().await;
        // Wall clock may step backwards; never hand out an earlier timestamp.
        let now = Utc::now();
        let created_at = messages.last().map_or(now, |last| last.created_at.max(now));
        messages.push(ChatMessage::new(author, body, created_at));
        Ok(created_at)
    }

    async fn read_recent(&self, limit: u32) -> Result<Vec<ChatMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let skip = messages.len().saturating_sub(limit as usize);
        Ok(messages[skip..].to_vec())
    }

    async fn read_all(&self) -> Result<Vec<ChatMessage>, RepositoryError> {
        Ok(self.messages.read().await.clone())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.messages.read().await.len() as u64)
    }
}
