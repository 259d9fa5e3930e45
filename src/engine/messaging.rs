use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::{ChatMessage, Conversation};
use crate::models::user::{Actor, UserId};
use crate::realtime::Envelope;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct OutgoingMessage {
    pub receiver_id: UserId,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Persists a chat message, then routes it to the receiver.
///
/// History is authoritative; the live or push delivery that follows is best effort.
pub async fn send_message(
    state: &AppState,
    sender: &Actor,
    outgoing: OutgoingMessage,
) -> Result<ChatMessage, AppError> {
    let content = outgoing.content.trim().to_string();
    let image_url = outgoing
        .image_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty());

    if content.is_empty() && image_url.is_none() {
        return Err(AppError::InvalidArgument(
            "a message needs content or an image".to_string(),
        ));
    }
    if outgoing.receiver_id == sender.id {
        return Err(AppError::InvalidArgument(
            "cannot message yourself".to_string(),
        ));
    }
    if state.repo.user_by_id(outgoing.receiver_id).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "user {} not found",
            outgoing.receiver_id
        )));
    }

    let message = ChatMessage {
        id: Uuid::new_v4(),
        sender_id: sender.id,
        receiver_id: outgoing.receiver_id,
        content,
        image_url,
        is_read: false,
        created_at: Utc::now(),
    };
    state.repo.insert_message(message.clone()).await?;

    let delivery = state
        .notifier
        .route(message.receiver_id, Envelope::ChatMessage(message.clone()));
    debug!(
        message_id = %message.id,
        sender_id = %message.sender_id,
        receiver_id = %message.receiver_id,
        ?delivery,
        "chat message routed"
    );

    Ok(message)
}

/// The full history between `viewer` and `peer`, oldest first. Marks the peer's
/// messages to the viewer as read.
pub async fn thread(
    state: &AppState,
    viewer: &Actor,
    peer: UserId,
) -> Result<Vec<ChatMessage>, AppError> {
    let marked = state.repo.mark_read(peer, viewer.id).await?;
    if marked > 0 {
        info!(viewer_id = %viewer.id, peer_id = %peer, marked, "messages marked read");
    }
    state.repo.thread(viewer.id, peer).await
}

/// One entry per peer, most recent conversation first.
pub async fn conversations(
    state: &AppState,
    viewer: &Actor,
) -> Result<Vec<Conversation>, AppError> {
    let mut by_peer: HashMap<UserId, Conversation> = HashMap::new();

    for message in state.repo.messages_involving(viewer.id).await? {
        let incoming = message.receiver_id == viewer.id;
        let peer = if incoming {
            message.sender_id
        } else {
            message.receiver_id
        };

        let entry = by_peer.entry(peer).or_insert_with(|| Conversation {
            peer_id: peer,
            peer_name: None,
            last_message: String::new(),
            last_message_at: message.created_at,
            unread: 0,
        });
        entry.last_message = message.content.clone();
        entry.last_message_at = message.created_at;
        if incoming && !message.is_read {
            entry.unread += 1;
        }
    }

    let mut list: Vec<Conversation> = by_peer.into_values().collect();
    for conversation in &mut list {
        conversation.peer_name = state
            .repo
            .user_by_id(conversation.peer_id)
            .await?
            .map(|user| user.name);
    }
    list.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    Ok(list)
}

pub async fn unread_count(state: &AppState, viewer: &Actor) -> Result<usize, AppError> {
    state.repo.unread_count(viewer.id).await
}
