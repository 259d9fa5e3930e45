use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::engine::assignment::auto_assign;
use crate::engine::orders::{
    NewOrder, available_orders, delivery_code_for, list_orders, order_for_viewer, submit_order,
};
use crate::engine::tracking::tracked_location;
use crate::engine::transitions::{confirm_delivery, transition};
use crate::error::AppError;
use crate::models::assignment::{Assignment, DispatchOutcome};
use crate::models::courier::CourierLocation;
use crate::models::order::{Order, OrderStatus};
use crate::models::user::Role;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(orders))
        .route("/orders/available", get(available))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", patch(update_status))
        .route("/orders/:id/dispatch", post(dispatch_order))
        .route("/orders/:id/claim", post(claim_order))
        .route("/orders/:id/courier-location", get(courier_location))
        .route("/orders/:id/delivery-code", get(delivery_code))
        .route("/assignments", get(list_assignments))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub delivery_code: Option<String>,
}

#[derive(Serialize)]
pub struct DeliveryCodeResponse {
    pub order_id: Uuid,
    pub delivery_code: String,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = submit_order(&state, &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn orders(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(list_orders(&state, &actor).await?))
}

async fn available(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(available_orders(&state, &actor).await?))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(order_for_viewer(&state, id, &actor).await?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let order = match payload.status {
        OrderStatus::Delivered => {
            confirm_delivery(&state, id, payload.delivery_code.as_deref(), &actor).await?
        }
        status => transition(&state, id, status, &actor).await?,
    };
    Ok(Json(order))
}

async fn delivery_code(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryCodeResponse>, AppError> {
    let delivery_code = delivery_code_for(&state, id, &actor).await?;
    Ok(Json(DeliveryCodeResponse {
        order_id: id,
        delivery_code,
    }))
}

async fn dispatch_order(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DispatchOutcome>, AppError> {
    Ok(Json(auto_assign(&state, id, &actor).await?))
}

async fn claim_order(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    if actor.role != Role::Courier {
        return Err(AppError::Forbidden("only couriers claim orders".to_string()));
    }
    Ok(Json(transition(&state, id, OrderStatus::Assigned, &actor).await?))
}

async fn courier_location(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CourierLocation>, AppError> {
    Ok(Json(tracked_location(&state, id, &actor).await?))
}

async fn list_assignments(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
) -> Result<Json<Vec<Assignment>>, AppError> {
    if !actor.role.is_staff() {
        return Err(AppError::Forbidden("staff only".to_string()));
    }
    Ok(Json(state.repo.assignments().await?))
}
