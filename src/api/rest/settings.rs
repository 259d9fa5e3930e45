use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::get;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::user::Role;
use crate::pricing::{BASE_FEE_SETTING, COMMISSION_RATE_SETTING, parse_commission_rate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/settings/:key", get(get_setting).put(put_setting))
}

#[derive(Deserialize)]
pub struct SettingValue {
    pub value: String,
}

#[derive(Serialize)]
struct SettingResponse {
    key: String,
    value: String,
}

async fn get_setting(
    State(state): State<Arc<AppState>>,
    AuthUser(_actor): AuthUser,
    Path(key): Path<String>,
) -> Result<Json<SettingResponse>, AppError> {
    let value = state
        .repo
        .setting(&key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("setting {key} not found")))?;
    Ok(Json(SettingResponse { key, value }))
}

async fn put_setting(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(key): Path<String>,
    Json(payload): Json<SettingValue>,
) -> Result<Json<SettingResponse>, AppError> {
    if actor.role != Role::Admin {
        return Err(AppError::Forbidden("only admins change settings".to_string()));
    }

    let value = payload.value.trim().to_string();
    if key == BASE_FEE_SETTING && !value.parse::<i64>().is_ok_and(|fee| fee >= 0) {
        return Err(AppError::InvalidArgument(format!(
            "{BASE_FEE_SETTING} must be a non-negative integer"
        )));
    }
    if key == COMMISSION_RATE_SETTING && parse_commission_rate(&value).is_none() {
        return Err(AppError::InvalidArgument(format!(
            "{COMMISSION_RATE_SETTING} must be a fraction between 0 and 1"
        )));
    }

    state.repo.put_setting(&key, value.clone()).await?;
    info!(key = %key, value = %value, "setting updated");
    Ok(Json(SettingResponse { key, value }))
}
