use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::models::user::UserId;
use crate::realtime::envelope::Envelope;

pub type ConnectionId = Uuid;

pub const DEFAULT_CONNECTION_BUFFER: usize = 64;

/// Sending half of one live connection.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    tx: mpsc::Sender<Envelope>,
}

impl Connection {
    pub fn open() -> (Self, mpsc::Receiver<Envelope>) {
        Self::with_capacity(DEFAULT_CONNECTION_BUFFER)
    }

    /// Creates a connection handle and the receiver its socket task drains.
    /// At most `capacity` frames wait for a slow socket.
    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    /// Queues a frame without waiting. `Full` means the socket is behind; `Closed` means it
    /// has gone away. Both hand the frame back.
    pub fn send(&self, envelope: Envelope) -> Result<(), TrySendError<Envelope>> {
        self.tx.try_send(envelope)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Which participants currently hold a live connection.
///
/// One handle per participant; registering again replaces the previous handle.
/// Cloning shares the same table.
#[derive(Debug, Clone, Default)]
pub struct PresenceRegistry {
    connections: Arc<DashMap<UserId, Connection>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, participant: UserId, connection: Connection) -> Option<Connection> {
        self.connections.insert(participant, connection)
    }

    pub fn unregister(&self, participant: UserId) -> Option<Connection> {
        self.connections
            .remove(&participant)
            .map(|(_, connection)| connection)
    }

    /// Removes the entry only if it still belongs to `connection_id`.
    pub fn unregister_connection(&self, participant: UserId, connection_id: ConnectionId) -> bool {
        self.connections
            .remove_if(&participant, |_, current| current.id == connection_id)
            .is_some()
    }

    pub fn lookup(&self, participant: UserId) -> Option<Connection> {
        self.connections
            .get(&participant)
            .map(|entry| entry.value().clone())
    }

    pub fn is_online(&self, participant: UserId) -> bool {
        self.connections
            .get(&participant)
            .map(|entry| !entry.is_closed())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
