use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::queue::enqueue_dispatch;
use crate::engine::transitions::assign_courier;
use crate::error::AppError;
use crate::geo::{GeoPoint, haversine_km};
use crate::models::assignment::{Assignment, DispatchOutcome};
use crate::models::courier::CourierLocation;
use crate::models::order::{Order, OrderId, OrderStatus};
use crate::models::user::{Actor, Role, UserId};
use crate::realtime::{Envelope, Notification};
use crate::state::AppState;

/// Drains the automatic dispatch queue, retrying orders that found no courier.
pub async fn run_dispatch_worker(state: Arc<AppState>, mut order_rx: mpsc::Receiver<OrderId>) {
    info!("dispatch worker started");

    let dispatcher = Actor::dispatcher();
    while let Some(order_id) = order_rx.recv().await {
        state.metrics.dispatch_queue_depth.dec();

        match auto_assign(&state, order_id, &dispatcher).await {
            Ok(DispatchOutcome::Assigned { courier_id, .. }) => {
                debug!(order_id = %order_id, courier_id = %courier_id, "queued order dispatched");
            }
            Ok(DispatchOutcome::NoCouriersAvailable { .. }) => {
                let retry = Duration::from_millis(state.config.dispatch_retry_ms);
                warn!(order_id = %order_id, retry_ms = state.config.dispatch_retry_ms, "no couriers available; retrying later");

                let state = state.clone();
                tokio::spawn(async move {
                    sleep(retry).await;
                    if let Err(err) = enqueue_dispatch(&state, order_id).await {
                        error!(order_id = %order_id, error = %err, "failed to re-queue order");
                    }
                });
            }
            Err(AppError::InvalidState(reason) | AppError::NotFound(reason)) => {
                debug!(order_id = %order_id, reason = %reason, "order no longer dispatchable");
            }
            Err(err) => {
                error!(order_id = %order_id, error = %err, "automatic dispatch failed");
            }
        }
    }

    warn!("dispatch worker stopped: queue channel closed");
}

/// Assigns the nearest eligible courier to a ready, unassigned order.
pub async fn auto_assign(
    state: &AppState,
    order_id: OrderId,
    requester: &Actor,
) -> Result<DispatchOutcome, AppError> {
    let start = Instant::now();
    let result = dispatch(state, order_id, requester).await;

    let outcome = match &result {
        Ok(DispatchOutcome::Assigned { .. }) => "assigned",
        Ok(DispatchOutcome::NoCouriersAvailable { .. }) => "no_couriers",
        Err(err) => err.kind(),
    };
    state
        .metrics
        .record_dispatch(outcome, start.elapsed().as_secs_f64());

    result
}

async fn dispatch(
    state: &AppState,
    order_id: OrderId,
    requester: &Actor,
) -> Result<DispatchOutcome, AppError> {
    let order = state
        .repo
        .order_by_id(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    authorize_requester(requester, &order)?;
    ensure_dispatchable(&order)?;

    let origin = seller_location(state, &order).await?;

    let since = Utc::now() - state.config.freshness_window();
    let candidates = state.repo.dispatch_candidates(since).await?;

    let Some((courier_id, distance_km)) = select_nearest(&origin, &candidates) else {
        info!(order_id = %order_id, "no couriers available");
        return Ok(DispatchOutcome::NoCouriersAvailable { order_id });
    };

    let order = assign_courier(state, order_id, courier_id, requester).await?;

    let assignment = Assignment {
        id: Uuid::new_v4(),
        order_id,
        courier_id,
        distance_km,
        requested_by: requester.role,
        assigned_at: Utc::now(),
    };
    // The order is already assigned; a lost log entry must not hide that.
    if let Err(err) = state.repo.record_assignment(assignment).await {
        warn!(order_id = %order_id, courier_id = %courier_id, error = %err, "failed to record assignment");
    }

    state.notifier.route(
        courier_id,
        Envelope::Notification(Notification::new(
            "New delivery",
            format!("Pick up order {order_id}, {distance_km:.1} km away"),
            json!({
                "order_id": order_id,
                "distance_km": distance_km,
                "pickup": origin,
                "dropoff": order.delivery_location,
            }),
        )),
    );

    info!(
        order_id = %order_id,
        courier_id = %courier_id,
        distance_km,
        candidates = candidates.len(),
        "order dispatched"
    );

    Ok(DispatchOutcome::Assigned {
        courier_id,
        distance_km,
        order,
    })
}

fn authorize_requester(requester: &Actor, order: &Order) -> Result<(), AppError> {
    match requester.role {
        Role::Admin | Role::Dispatcher => Ok(()),
        Role::Seller if requester.id == order.seller_id => Ok(()),
        Role::Seller => Err(AppError::Forbidden(
            "only the order's seller may request dispatch".to_string(),
        )),
        Role::Buyer | Role::Courier => Err(AppError::Forbidden(format!(
            "{:?} may not request dispatch",
            requester.role
        ))),
    }
}

fn ensure_dispatchable(order: &Order) -> Result<(), AppError> {
    if order.courier_id.is_some() {
        return Err(AppError::InvalidState(format!(
            "order {} already assigned",
            order.id
        )));
    }
    if order.status != OrderStatus::Ready {
        return Err(AppError::InvalidState(format!(
            "order {} is not ready (status {})",
            order.id, order.status
        )));
    }
    Ok(())
}

async fn seller_location(state: &AppState, order: &Order) -> Result<GeoPoint, AppError> {
    let seller = state
        .repo
        .user_by_id(order.seller_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("seller {} not found", order.seller_id)))?;

    seller.location.ok_or_else(|| {
        AppError::MissingConfiguration(format!("seller {} has no registered location", seller.id))
    })
}

/// Nearest candidate to `origin`. Equal distances go to the lowest courier id.
pub fn select_nearest(origin: &GeoPoint, candidates: &[CourierLocation]) -> Option<(UserId, f64)> {
    candidates
        .iter()
        .map(|candidate| (candidate.courier_id, haversine_km(origin, &candidate.location)))
        .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
}
