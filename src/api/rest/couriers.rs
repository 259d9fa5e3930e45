use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, put};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::engine::tracking::{courier_location, set_own_location, set_verification, update_location};
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::courier::CourierLocation;
use crate::models::user::User;
use crate::pricing::{FeeEstimate, estimate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers/me/location", put(report_location))
        .route("/couriers/:id/location", get(get_location))
        .route("/users/me/location", put(register_location))
        .route("/users/:id/verification", patch(update_verification))
        .route("/delivery/estimate", get(delivery_estimate))
}

#[derive(Deserialize)]
pub struct LocationPing {
    pub lat: f64,
    pub lng: f64,
    #[serde(default = "online")]
    pub is_online: bool,
}

fn online() -> bool {
    true
}

#[derive(Deserialize)]
pub struct VerificationRequest {
    pub is_verified: bool,
}

#[derive(Deserialize)]
pub struct EstimateQuery {
    pub from_lat: f64,
    pub from_lng: f64,
    pub to_lat: f64,
    pub to_lng: f64,
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<LocationPing>,
) -> Result<Json<CourierLocation>, AppError> {
    let point = GeoPoint {
        lat: payload.lat,
        lng: payload.lng,
    };
    Ok(Json(
        update_location(&state, &actor, point, payload.is_online).await?,
    ))
}

async fn get_location(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CourierLocation>, AppError> {
    Ok(Json(courier_location(&state, id, &actor).await?))
}

async fn register_location(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<GeoPoint>,
) -> Result<Json<User>, AppError> {
    Ok(Json(set_own_location(&state, &actor, payload).await?))
}

async fn update_verification(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerificationRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(
        set_verification(&state, &actor, id, payload.is_verified).await?,
    ))
}

async fn delivery_estimate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EstimateQuery>,
) -> Result<Json<FeeEstimate>, AppError> {
    let from = GeoPoint::new(query.from_lat, query.from_lng)?;
    let to = GeoPoint::new(query.to_lat, query.to_lng)?;
    Ok(Json(estimate(&state, &from, &to).await))
}
