use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::models::courier::CourierLocation;
use crate::models::message::ChatMessage;
use crate::models::user::UserId;

/// A user-facing notification. Also the payload handed to the push transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Value,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>, data: Value) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data,
        }
    }
}

/// Server to client frame: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Envelope {
    Notification(Notification),
    ChatMessage(ChatMessage),
    MessageSent(ChatMessage),
    LocationUpdated(CourierLocation),
    Pong,
    Error { message: String },
}

impl Envelope {
    /// The out-of-band push equivalent, for frames worth waking a device for.
    pub fn to_push(&self) -> Option<Notification> {
        match self {
            Envelope::Notification(notification) => Some(notification.clone()),
            Envelope::ChatMessage(message) => Some(Notification::new(
                "New message",
                preview(&message.content),
                json!({
                    "message_id": message.id,
                    "sender_id": message.sender_id,
                }),
            )),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Notification(_) => "notification",
            Envelope::ChatMessage(_) => "chat_message",
            Envelope::MessageSent(_) => "message_sent",
            Envelope::LocationUpdated(_) => "location_updated",
            Envelope::Pong => "pong",
            Envelope::Error { .. } => "error",
        }
    }
}

fn preview(content: &str) -> String {
    const MAX_CHARS: usize = 80;
    if content.chars().count() <= MAX_CHARS {
        return content.to_string();
    }
    let mut truncated: String = content.chars().take(MAX_CHARS).collect();
    truncated.push('…');
    truncated
}

/// Client to server frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    ChatMessage {
        receiver_id: UserId,
        #[serde(default)]
        content: String,
        #[serde(default)]
        image_url: Option<String>,
    },
    Location {
        lat: f64,
        lng: f64,
        #[serde(default = "default_online")]
        is_online: bool,
    },
    Ping,
}

fn default_online() -> bool {
    true
}
