use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::auth::{authenticate, bearer_token};
use crate::engine::messaging::{OutgoingMessage, send_message};
use crate::engine::tracking::update_location;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::user::Actor;
use crate::realtime::{ClientFrame, Connection, Envelope};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Authenticates before upgrading so a bad token is a plain 401.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let actor = match params.token.as_deref() {
        Some(token) => authenticate(&state, token).await?,
        None => authenticate(&state, bearer_token(&headers)?).await?,
    };
    let ws = ws.map_err(|rejection| AppError::InvalidArgument(rejection.body_text()))?;

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, actor))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, actor: Actor) {
    let (mut sender, mut receiver) = socket.split();
    let (connection, rx) = Connection::with_capacity(state.config.connection_buffer_size);
    let connection_id = connection.id;
    let replies = connection.clone();

    if state.presence.register(actor.id, connection).is_some() {
        debug!(user_id = %actor.id, "replaced previous live connection");
    }
    state.metrics.live_connections.set(state.presence.len() as i64);
    info!(user_id = %actor.id, connection_id = %connection_id, "live connection opened");

    let mut outbound = ReceiverStream::new(rx);
    let mut send_task = tokio::spawn(async move {
        while let Some(envelope) = outbound.next().await {
            let json = match serde_json::to_string(&envelope) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, kind = envelope.kind(), "failed to serialize frame for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let reply = match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => handle_frame(&recv_state, &actor, frame).await,
                Err(err) => Envelope::Error {
                    message: format!("malformed frame: {err}"),
                },
            };
            match replies.send(reply) {
                Ok(()) => {}
                Err(TrySendError::Full(dropped)) => {
                    warn!(user_id = %actor.id, kind = dropped.kind(), "outbound buffer full; reply dropped");
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.presence.unregister_connection(actor.id, connection_id);
    state.metrics.live_connections.set(state.presence.len() as i64);
    info!(user_id = %actor.id, connection_id = %connection_id, "live connection closed");
}

/// Applies one client frame and returns the reply for the sender.
pub async fn handle_frame(state: &AppState, actor: &Actor, frame: ClientFrame) -> Envelope {
    let result = match frame {
        ClientFrame::ChatMessage {
            receiver_id,
            content,
            image_url,
        } => send_message(
            state,
            actor,
            OutgoingMessage {
                receiver_id,
                content,
                image_url,
            },
        )
        .await
        .map(Envelope::MessageSent),
        ClientFrame::Location { lat, lng, is_online } => {
            update_location(state, actor, GeoPoint { lat, lng }, is_online)
                .await
                .map(Envelope::LocationUpdated)
        }
        ClientFrame::Ping => Ok(Envelope::Pong),
    };

    result.unwrap_or_else(|err| Envelope::Error {
        message: err.to_string(),
    })
}
