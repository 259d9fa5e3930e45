use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::{Order, OrderId};
use crate::models::user::{Role, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub order_id: OrderId,
    pub courier_id: UserId,
    pub distance_km: f64,
    pub requested_by: Role,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Assigned {
        courier_id: UserId,
        distance_km: f64,
        order: Order,
    },
    NoCouriersAvailable {
        order_id: OrderId,
    },
}
