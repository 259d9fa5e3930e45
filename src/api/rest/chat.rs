use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::engine::messaging::{OutgoingMessage, conversations, send_message, thread, unread_count};
use crate::error::AppError;
use crate::models::message::{ChatMessage, Conversation};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(send))
        .route("/chat/conversations", get(list_conversations))
        .route("/chat/unread", get(unread))
        .route("/chat/:peer_id", get(history))
}

#[derive(Serialize)]
struct UnreadResponse {
    unread: usize,
}

async fn send(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<OutgoingMessage>,
) -> Result<(StatusCode, Json<ChatMessage>), AppError> {
    let message = send_message(&state, &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
) -> Result<Json<Vec<Conversation>>, AppError> {
    Ok(Json(conversations(&state, &actor).await?))
}

async fn unread(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
) -> Result<Json<UnreadResponse>, AppError> {
    let unread = unread_count(&state, &actor).await?;
    Ok(Json(UnreadResponse { unread }))
}

async fn history(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(peer_id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    Ok(Json(thread(&state, &actor, peer_id).await?))
}
