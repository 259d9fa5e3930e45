use std::sync::Arc;

use tokio::sync::mpsc;

use crate::auth::{CredentialVerifier, TokenRegistry};
use crate::config::Config;
use crate::models::order::OrderId;
use crate::observability::metrics::Metrics;
use crate::pricing::PricingPolicy;
use crate::realtime::{LogPushTransport, NotificationRouter, PresenceRegistry, PushTransport};
use crate::store::{MemoryStore, Repository};

pub struct AppState {
    pub config: Config,
    pub repo: Arc<dyn Repository>,
    pub presence: PresenceRegistry,
    pub notifier: NotificationRouter,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub pricing: PricingPolicy,
    pub dispatch_tx: mpsc::Sender<OrderId>,
    pub metrics: Metrics,
}

impl AppState {
    /// In-memory store, log push transport and an empty token registry.
    pub fn new(config: Config) -> (Self, mpsc::Receiver<OrderId>) {
        Self::with_collaborators(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(LogPushTransport),
            Arc::new(TokenRegistry::new()),
        )
    }

    pub fn with_collaborators(
        config: Config,
        repo: Arc<dyn Repository>,
        push: Arc<dyn PushTransport>,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> (Self, mpsc::Receiver<OrderId>) {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_queue_size.max(1));
        let metrics = Metrics::new();
        let presence = PresenceRegistry::new();
        let notifier = NotificationRouter::new(presence.clone(), push, metrics.clone());

        (
            Self {
                pricing: PricingPolicy::from_config(&config),
                config,
                repo,
                presence,
                notifier,
                credentials,
                dispatch_tx,
                metrics,
            },
            dispatch_rx,
        )
    }
}
