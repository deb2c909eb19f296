//! Chat message HTTP handlers.
//!
//! Endpoints:
//! - GET  /api/v1/messages?limit=N - Read the stored chat log, oldest first
//! - POST /api/v1/messages         - Post a message as if sent over a socket

use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use murmur_core::repository::message::MessageStore;
use murmur_types::chat::ChatMessage;

use crate::http::error::AppError;
use crate::http::extractors::query::MessageListQuery;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for posting a message.
#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub author: String,
    pub body: String,
}

/// GET /api/v1/messages - List stored messages.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageListQuery>,
) -> Result<ApiResponse<Vec<ChatMessage>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let store = state.engine.store();
    let messages = match query.limit {
        Some(limit) => store.read_recent(limit).await?,
        None => store.read_all().await?,
    };

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(ApiResponse::success(messages, request_id, elapsed))
}

/// POST /api/v1/messages - Persist a message and broadcast it to every session.
pub async fn post_message(
    State(state): State<AppState>,
    Json(body): Json<PostMessageRequest>,
) -> Result<ApiResponse<ChatMessage>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let message = state.engine.post_message(&body.author, &body.body).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(ApiResponse::success(message, request_id, elapsed).with_status(StatusCode::CREATED))
}
