use chrono::Utc;
use tracing::{debug, info};

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::courier::CourierLocation;
use crate::models::order::OrderId;
use crate::models::user::{Actor, Role, User, UserId};
use crate::state::AppState;

/// Records a courier's position ping. Last write wins.
pub async fn update_location(
    state: &AppState,
    actor: &Actor,
    location: GeoPoint,
    is_online: bool,
) -> Result<CourierLocation, AppError> {
    if actor.role != Role::Courier {
        return Err(AppError::Forbidden(
            "only couriers report a location".to_string(),
        ));
    }

    let record = CourierLocation {
        courier_id: actor.id,
        location: location.validated()?,
        is_online,
        last_updated: Utc::now(),
    };
    state.repo.upsert_location(record.clone()).await?;

    debug!(courier_id = %actor.id, is_online, "courier location updated");
    Ok(record)
}

pub async fn courier_location(
    state: &AppState,
    courier_id: UserId,
    viewer: &Actor,
) -> Result<CourierLocation, AppError> {
    if !viewer.role.is_staff() && viewer.id != courier_id {
        return Err(AppError::Forbidden("access denied".to_string()));
    }
    stored_location(state, courier_id).await
}

/// Where the courier carrying `order_id` is right now.
pub async fn tracked_location(
    state: &AppState,
    order_id: OrderId,
    viewer: &Actor,
) -> Result<CourierLocation, AppError> {
    let order = state
        .repo
        .order_by_id(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    let allowed = viewer.role.is_staff()
        || (order.buyer_id == viewer.id && order.status.is_active_delivery())
        || (order.courier_id.is_some() && order.courier_id == Some(viewer.id));
    if !allowed {
        return Err(AppError::Forbidden(
            "courier location is visible to the buyer during delivery".to_string(),
        ));
    }

    let courier_id = order
        .courier_id
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} has no courier")))?;
    stored_location(state, courier_id).await
}

async fn stored_location(state: &AppState, courier_id: UserId) -> Result<CourierLocation, AppError> {
    state
        .repo
        .location(courier_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no location reported for courier {courier_id}")))
}

/// Registers the caller's own coordinates, used as the pickup point for sellers.
pub async fn set_own_location(
    state: &AppState,
    actor: &Actor,
    location: GeoPoint,
) -> Result<User, AppError> {
    let user = state
        .repo
        .set_user_location(actor.id, location.validated()?)
        .await?;
    info!(user_id = %user.id, "user location registered");
    Ok(user)
}

pub async fn set_verification(
    state: &AppState,
    actor: &Actor,
    user_id: UserId,
    verified: bool,
) -> Result<User, AppError> {
    if actor.role != Role::Admin {
        return Err(AppError::Forbidden(
            "only admins change verification".to_string(),
        ));
    }
    let user = state.repo.set_verified(user_id, verified).await?;
    info!(user_id = %user.id, verified, "verification updated");
    Ok(user)
}
