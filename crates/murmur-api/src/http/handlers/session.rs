//! Live session HTTP handlers.
//!
//! Endpoints:
//! - GET /api/v1/sessions - Snapshot of connected sessions in connect order

use std::time::Instant;

use axum::extract::State;
use uuid::Uuid;

use murmur_types::session::Session;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/v1/sessions - List connected sessions.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<Session>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sessions = state.engine.sessions().await;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(ApiResponse::success(sessions, request_id, elapsed))
}
