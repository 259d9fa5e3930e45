use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::EnvFilter;

use market_dispatch::auth::TokenRegistry;
use market_dispatch::config::{Config, LogFormat};
use market_dispatch::error::AppError;
use market_dispatch::geo::GeoPoint;
use market_dispatch::models::courier::CourierLocation;
use market_dispatch::models::user::{Role, User};
use market_dispatch::realtime::LogPushTransport;
use market_dispatch::state::AppState;
use market_dispatch::store::MemoryStore;
use market_dispatch::{api, engine};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    let tokens = Arc::new(TokenRegistry::new());
    let (app_state, dispatch_rx) = AppState::with_collaborators(
        config.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(LogPushTransport),
        tokens.clone(),
    );
    let shared_state = Arc::new(app_state);

    if config.seed_demo_users {
        seed_demo_users(&shared_state, &tokens).await?;
    }

    tokio::spawn(engine::assignment::run_dispatch_worker(
        shared_state.clone(),
        dispatch_rx,
    ));

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        auto_dispatch = config.auto_dispatch,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

/// One participant per role, with bearer tokens logged for local use.
async fn seed_demo_users(state: &AppState, tokens: &TokenRegistry) -> Result<(), AppError> {
    let shop = GeoPoint::new(41.311, 69.279)?;

    let buyer = User::new("Demo Buyer", Role::Buyer);
    let mut seller = User::new("Demo Seller", Role::Seller);
    seller.location = Some(shop);
    let mut courier = User::new("Demo Courier", Role::Courier);
    courier.is_verified = true;
    let admin = User::new("Demo Admin", Role::Admin);

    for user in [&buyer, &seller, &courier, &admin] {
        state.repo.insert_user(user.clone()).await?;
        tracing::info!(
            user_id = %user.id,
            role = ?user.role,
            token = %tokens.issue(user.id),
            "demo user seeded"
        );
    }

    state
        .repo
        .upsert_location(CourierLocation {
            courier_id: courier.id,
            location: GeoPoint::new(41.32, 69.25)?,
            is_online: true,
            last_updated: Utc::now(),
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
