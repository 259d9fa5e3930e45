use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::models::user::UserId;

/// Last reported position of a courier. Overwritten on every ping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierLocation {
    pub courier_id: UserId,
    pub location: GeoPoint,
    pub is_online: bool,
    pub last_updated: DateTime<Utc>,
}

impl CourierLocation {
    pub fn is_fresh(&self, since: DateTime<Utc>) -> bool {
        self.last_updated >= since
    }
}
