use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::models::user::UserId;
use crate::observability::metrics::Metrics;
use crate::realtime::envelope::Envelope;
use crate::realtime::presence::PresenceRegistry;
use crate::realtime::push::PushTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on the recipient's live connection.
    Live,
    /// Handed to the push transport in the background.
    Push,
    /// Recipient offline and the frame has no push form.
    Dropped,
}

/// Routes frames to a participant's live connection, falling back to push.
#[derive(Clone)]
pub struct NotificationRouter {
    presence: PresenceRegistry,
    push: Arc<dyn PushTransport>,
    metrics: Metrics,
}

impl NotificationRouter {
    pub fn new(presence: PresenceRegistry, push: Arc<dyn PushTransport>, metrics: Metrics) -> Self {
        Self {
            presence,
            push,
            metrics,
        }
    }

    /// Never blocks on I/O and never fails.
    pub fn route(&self, recipient: UserId, envelope: Envelope) -> Delivery {
        let envelope = match self.presence.lookup(recipient) {
            Some(connection) => match connection.send(envelope) {
                Ok(()) => {
                    self.metrics.record_notification("live");
                    debug!(recipient = %recipient, "delivered over live connection");
                    return Delivery::Live;
                }
                Err(TrySendError::Full(undelivered)) => {
                    warn!(recipient = %recipient, "live connection backed up; falling back to push");
                    undelivered
                }
                Err(TrySendError::Closed(undelivered)) => {
                    warn!(recipient = %recipient, "live connection closed; falling back to push");
                    self.presence.unregister_connection(recipient, connection.id);
                    self.metrics.live_connections.set(self.presence.len() as i64);
                    undelivered
                }
            },
            None => envelope,
        };

        let Some(notification) = envelope.to_push() else {
            self.metrics.record_notification("dropped");
            return Delivery::Dropped;
        };

        let push = self.push.clone();
        tokio::spawn(async move {
            match push.send(recipient, &notification).await {
                Ok(delivered) => {
                    debug!(recipient = %recipient, delivered, "push notification sent");
                }
                Err(err) => {
                    warn!(recipient = %recipient, error = %err, "push notification failed");
                }
            }
        });

        self.metrics.record_notification("push");
        Delivery::Push
    }
}
