use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::models::user::UserId;

pub type OrderId = Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Ready,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Pending,
        OrderStatus::Accepted,
        OrderStatus::Ready,
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
        OrderStatus::Rejected,
        OrderStatus::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }

    /// Statuses during which a courier is carrying or about to carry the order.
    pub fn is_active_delivery(&self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned | OrderStatus::PickedUp | OrderStatus::InTransit
        )
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    ///
    /// `Ready -> PickedUp` exists only for a courier claiming an unassigned order at
    /// pickup time; the caller is responsible for enforcing that.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        if self.is_terminal() {
            return false;
        }

        matches!(
            (*self, next),
            (Pending, Accepted)
                | (Accepted, Ready)
                | (Ready, Assigned)
                | (Ready, PickedUp)
                | (Assigned, PickedUp)
                | (PickedUp, InTransit)
                | (InTransit, Delivered)
                | (_, Rejected)
                | (_, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Ready => "ready",
            OrderStatus::Assigned => "assigned",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Payme,
    Click,
}

/// Price snapshot taken when the order is placed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price: i64,
}

impl OrderItem {
    pub fn line_total(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub courier_id: Option<UserId>,
    pub items: Vec<OrderItem>,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub total: i64,
    /// Share of `subtotal` kept by the platform, fixed at submission.
    pub platform_commission: i64,
    /// `subtotal - platform_commission`.
    pub seller_amount: i64,
    pub delivery_location: GeoPoint,
    pub delivery_address: Option<String>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub status: OrderStatus,
    /// Six digits handed to the buyer when a courier takes the order. The courier must
    /// present it to mark the order delivered. Never serialized.
    #[serde(skip_serializing, default)]
    pub delivery_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id || self.courier_id == Some(user_id)
    }

    pub fn is_dispatchable(&self) -> bool {
        self.status == OrderStatus::Ready && self.courier_id.is_none()
    }

    pub fn accepts_delivery_code(&self, presented: Option<&str>) -> bool {
        match (&self.delivery_code, presented) {
            (Some(expected), Some(given)) => expected == given.trim(),
            _ => false,
        }
    }
}

pub fn generate_delivery_code() -> String {
    format!("{:06}", Uuid::new_v4().as_u128() % 1_000_000)
}
