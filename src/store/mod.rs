//! Persistence contracts the core relies on.
//!
//! The service only ever talks to these traits. `MemoryStore` is the in-process
//! implementation used by the binary and the tests; a relational backend implements the
//! same contracts, with `compare_and_set_status` becoming an
//! `UPDATE ... WHERE status = $expected AND courier_id IS NOT DISTINCT FROM $expected`.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::assignment::Assignment;
use crate::models::courier::CourierLocation;
use crate::models::message::ChatMessage;
use crate::models::order::{Order, OrderId, OrderStatus};
use crate::models::user::{User, UserId};

pub use memory::MemoryStore;

/// The state a conditional order update was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedOrderState {
    pub status: OrderStatus,
    pub courier_id: Option<UserId>,
}

impl From<&Order> for ExpectedOrderState {
    fn from(order: &Order) -> Self {
        Self {
            status: order.status,
            courier_id: order.courier_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    /// Stamped only when the order has no courier yet; a set courier is never replaced.
    pub courier_id: Option<UserId>,
    /// Written together with `courier_id` and under the same rule.
    pub delivery_code: Option<String>,
}

#[derive(Debug, Clone)]
pub enum CasOutcome {
    Applied(Order),
    Conflict { current: Order },
}

#[derive(Debug, Clone, Copy)]
pub enum OrderFilter {
    All,
    Buyer(UserId),
    Seller(UserId),
    /// Orders carried by the courier plus every unassigned ready order.
    Courier(UserId),
    Available,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            OrderFilter::All => true,
            OrderFilter::Buyer(id) => order.buyer_id == *id,
            OrderFilter::Seller(id) => order.seller_id == *id,
            OrderFilter::Courier(id) => order.courier_id == Some(*id) || order.is_dispatchable(),
            OrderFilter::Available => order.is_dispatchable(),
        }
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert_order(&self, order: Order) -> Result<(), AppError>;

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, AppError>;

    /// Newest first.
    async fn orders_matching(&self, filter: OrderFilter) -> Result<Vec<Order>, AppError>;

    /// Applies `update` only if the stored order still matches `expected`.
    async fn compare_and_set_status(
        &self,
        id: OrderId,
        expected: ExpectedOrderState,
        update: StatusUpdate,
    ) -> Result<CasOutcome, AppError>;
}

#[async_trait]
pub trait CourierRepository: Send + Sync {
    async fn upsert_location(&self, location: CourierLocation) -> Result<(), AppError>;

    async fn location(&self, courier_id: UserId) -> Result<Option<CourierLocation>, AppError>;

    /// Online, verified couriers whose location was reported at or after `since`.
    async fn dispatch_candidates(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<CourierLocation>, AppError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert_user(&self, user: User) -> Result<(), AppError>;

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, AppError>;

    async fn set_user_location(&self, id: UserId, location: GeoPoint) -> Result<User, AppError>;

    async fn set_verified(&self, id: UserId, verified: bool) -> Result<User, AppError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert_message(&self, message: ChatMessage) -> Result<(), AppError>;

    /// Every message exchanged between `a` and `b`, oldest first.
    async fn thread(&self, a: UserId, b: UserId) -> Result<Vec<ChatMessage>, AppError>;

    /// Marks messages from `sender` to `receiver` as read. Returns how many changed.
    async fn mark_read(&self, sender: UserId, receiver: UserId) -> Result<usize, AppError>;

    /// Every message sent or received by `user`, oldest first.
    async fn messages_involving(&self, user: UserId) -> Result<Vec<ChatMessage>, AppError>;

    async fn unread_count(&self, receiver: UserId) -> Result<usize, AppError>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn setting(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn put_setting(&self, key: &str, value: String) -> Result<(), AppError>;
}

#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn record_assignment(&self, assignment: Assignment) -> Result<(), AppError>;

    async fn assignments(&self) -> Result<Vec<Assignment>, AppError>;
}

pub trait Repository:
    OrderRepository
    + CourierRepository
    + UserRepository
    + MessageRepository
    + SettingsRepository
    + AssignmentRepository
{
}

impl<T> Repository for T where
    T: OrderRepository
        + CourierRepository
        + UserRepository
        + MessageRepository
        + SettingsRepository
        + AssignmentRepository
{
}
