use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::models::user::UserId;
use crate::realtime::envelope::Notification;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push transport unavailable: {0}")]
    Unavailable(String),

    #[error("push rejected: {0}")]
    Rejected(String),
}

/// Out-of-band, best-effort delivery (mobile push, SMS, email).
///
/// Callers never wait on this and never fail because of it.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Returns how many devices accepted the notification.
    async fn send(&self, participant: UserId, notification: &Notification)
    -> Result<usize, PushError>;
}

/// Writes notifications to the log. Used when no real transport is configured.
#[derive(Debug, Default, Clone)]
pub struct LogPushTransport;

#[async_trait]
impl PushTransport for LogPushTransport {
    async fn send(
        &self,
        participant: UserId,
        notification: &Notification,
    ) -> Result<usize, PushError> {
        info!(
            participant = %participant,
            title = %notification.title,
            body = %notification.body,
            "push notification (log transport)"
        );
        Ok(0)
    }
}
