use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::TokenRegistry;
use crate::config::Config;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::assignment::Assignment;
use crate::models::courier::CourierLocation;
use crate::models::message::ChatMessage;
use crate::models::order::{
    Order, OrderId, OrderItem, OrderStatus, PaymentMethod, generate_delivery_code,
};
use crate::models::user::{Actor, Role, User, UserId};
use crate::pricing::commission_split;
use crate::realtime::{Notification, PushError, PushTransport};
use crate::state::AppState;
use crate::store::{
    AssignmentRepository, CasOutcome, CourierRepository, ExpectedOrderState, MemoryStore,
    MessageRepository, OrderFilter, OrderRepository, Repository, SettingsRepository,
    StatusUpdate, UserRepository,
};

pub const SELLER_LOCATION: GeoPoint = GeoPoint { lat: 41.3, lng: 69.2 };

#[derive(Default)]
pub struct RecordingPush {
    pub sent: Mutex<Vec<(UserId, Notification)>>,
    pub fail_with: Option<fn(String) -> PushError>,
}

impl RecordingPush {
    pub fn failing() -> Self {
        Self {
            fail_with: Some(PushError::Unavailable),
            ..Default::default()
        }
    }

    /// Every device token for the participant is refused.
    pub fn rejecting() -> Self {
        Self {
            fail_with: Some(PushError::Rejected),
            ..Default::default()
        }
    }

    pub fn recipients(&self) -> Vec<UserId> {
        self.sent.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    pub async fn wait_for(&self, count: usize) {
        for _ in 0..100 {
            if self.sent.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        panic!(
            "expected {count} pushes, saw {}",
            self.sent.lock().unwrap().len()
        );
    }
}

#[async_trait]
impl PushTransport for RecordingPush {
    async fn send(
        &self,
        participant: UserId,
        notification: &Notification,
    ) -> Result<usize, PushError> {
        self.sent
            .lock()
            .unwrap()
            .push((participant, notification.clone()));
        if let Some(fail) = self.fail_with {
            return Err(fail(format!("no device accepted push for {participant}")));
        }
        Ok(1)
    }
}

/// Delegates to `MemoryStore` but refuses to write the assignment log.
#[derive(Default)]
pub struct BrokenAssignmentLog {
    inner: MemoryStore,
}

#[async_trait]
impl OrderRepository for BrokenAssignmentLog {
    async fn insert_order(&self, order: Order) -> Result<(), AppError> {
        self.inner.insert_order(order).await
    }

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, AppError> {
        self.inner.order_by_id(id).await
    }

    async fn orders_matching(&self, filter: OrderFilter) -> Result<Vec<Order>, AppError> {
        self.inner.orders_matching(filter).await
    }

    async fn compare_and_set_status(
        &self,
        id: OrderId,
        expected: ExpectedOrderState,
        update: StatusUpdate,
    ) -> Result<CasOutcome, AppError> {
        self.inner.compare_and_set_status(id, expected, update).await
    }
}

#[async_trait]
impl CourierRepository for BrokenAssignmentLog {
    async fn upsert_location(&self, location: CourierLocation) -> Result<(), AppError> {
        self.inner.upsert_location(location).await
    }

    async fn location(&self, courier_id: UserId) -> Result<Option<CourierLocation>, AppError> {
        self.inner.location(courier_id).await
    }

    async fn dispatch_candidates(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<CourierLocation>, AppError> {
        self.inner.dispatch_candidates(since).await
    }
}

#[async_trait]
impl UserRepository for BrokenAssignmentLog {
    async fn insert_user(&self, user: User) -> Result<(), AppError> {
        self.inner.insert_user(user).await
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, AppError> {
        self.inner.user_by_id(id).await
    }

    async fn set_user_location(&self, id: UserId, location: GeoPoint) -> Result<User, AppError> {
        self.inner.set_user_location(id, location).await
    }

    async fn set_verified(&self, id: UserId, verified: bool) -> Result<User, AppError> {
        self.inner.set_verified(id, verified).await
    }
}

#[async_trait]
impl MessageRepository for BrokenAssignmentLog {
    async fn insert_message(&self, message: ChatMessage) -> Result<(), AppError> {
        self.inner.insert_message(message).await
    }

    async fn thread(&self, a: UserId, b: UserId) -> Result<Vec<ChatMessage>, AppError> {
        self.inner.thread(a, b).await
    }

    async fn mark_read(&self, sender: UserId, receiver: UserId) -> Result<usize, AppError> {
        self.inner.mark_read(sender, receiver).await
    }

    async fn messages_involving(&self, user: UserId) -> Result<Vec<ChatMessage>, AppError> {
        self.inner.messages_involving(user).await
    }

    async fn unread_count(&self, receiver: UserId) -> Result<usize, AppError> {
        self.inner.unread_count(receiver).await
    }
}

#[async_trait]
impl SettingsRepository for BrokenAssignmentLog {
    async fn setting(&self, key: &str) -> Result<Option<String>, AppError> {
        self.inner.setting(key).await
    }

    async fn put_setting(&self, key: &str, value: String) -> Result<(), AppError> {
        self.inner.put_setting(key, value).await
    }
}

#[async_trait]
impl AssignmentRepository for BrokenAssignmentLog {
    async fn record_assignment(&self, _assignment: Assignment) -> Result<(), AppError> {
        Err(AppError::Internal("assignment log unavailable".to_string()))
    }

    async fn assignments(&self) -> Result<Vec<Assignment>, AppError> {
        Ok(Vec::new())
    }
}

/// A state with one buyer and one seller, backed by the in-memory store.
pub struct Fixture {
    pub state: Arc<AppState>,
    pub tokens: Arc<TokenRegistry>,
    pub push: Arc<RecordingPush>,
    pub buyer: User,
    pub seller: User,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_push(RecordingPush::default()).await
    }

    pub async fn with_failing_push() -> Self {
        Self::with_push(RecordingPush::failing()).await
    }

    pub async fn with_push(push: RecordingPush) -> Self {
        Self::build(Config::default(), Some(SELLER_LOCATION), push, memory())
            .await
            .0
    }

    pub async fn without_seller_location() -> Self {
        Self::build(Config::default(), None, RecordingPush::default(), memory())
            .await
            .0
    }

    pub async fn with_config(config: Config) -> (Self, mpsc::Receiver<OrderId>) {
        Self::build(config, Some(SELLER_LOCATION), RecordingPush::default(), memory()).await
    }

    pub async fn with_repo(repo: Arc<dyn Repository>) -> Self {
        Self::build(Config::default(), Some(SELLER_LOCATION), RecordingPush::default(), repo)
            .await
            .0
    }

    async fn build(
        config: Config,
        seller_location: Option<GeoPoint>,
        push: RecordingPush,
        repo: Arc<dyn Repository>,
    ) -> (Self, mpsc::Receiver<OrderId>) {
        let tokens = Arc::new(TokenRegistry::new());
        let push = Arc::new(push);
        let (state, rx) = AppState::with_collaborators(config, repo, push.clone(), tokens.clone());
        let state = Arc::new(state);

        let buyer = User::new("buyer", Role::Buyer);
        let mut seller = User::new("seller", Role::Seller);
        seller.location = seller_location;
        state.repo.insert_user(buyer.clone()).await.unwrap();
        state.repo.insert_user(seller.clone()).await.unwrap();

        (
            Self {
                state,
                tokens,
                push,
                buyer,
                seller,
            },
            rx,
        )
    }

    pub fn buyer_actor(&self) -> Actor {
        Actor::from(&self.buyer)
    }

    pub fn seller_actor(&self) -> Actor {
        Actor::from(&self.seller)
    }

    pub async fn user(&self, name: &str, role: Role) -> User {
        let user = User::new(name, role);
        self.state.repo.insert_user(user.clone()).await.unwrap();
        user
    }

    /// A verified courier, online, reported just now.
    pub async fn courier(&self, lat: f64, lng: f64) -> User {
        self.courier_with(GeoPoint { lat, lng }, true, true, Duration::zero())
            .await
    }

    pub async fn courier_with(
        &self,
        location: GeoPoint,
        is_online: bool,
        is_verified: bool,
        age: Duration,
    ) -> User {
        let mut courier = User::new("courier", Role::Courier);
        courier.is_verified = is_verified;
        self.state.repo.insert_user(courier.clone()).await.unwrap();
        self.state
            .repo
            .upsert_location(CourierLocation {
                courier_id: courier.id,
                location,
                is_online,
                last_updated: Utc::now() - age,
            })
            .await
            .unwrap();
        courier
    }

    pub async fn order_with_status(&self, status: OrderStatus, courier: Option<UserId>) -> Order {
        let now = Utc::now();
        let items = vec![
            OrderItem {
                product_id: Uuid::new_v4(),
                quantity: 2,
                unit_price: 12_000,
            },
            OrderItem {
                product_id: Uuid::new_v4(),
                quantity: 1,
                unit_price: 30_500,
            },
        ];
        let subtotal = items.iter().map(OrderItem::line_total).sum();
        let split = commission_split(subtotal, 0.10);

        let order = Order {
            id: Uuid::new_v4(),
            buyer_id: self.buyer.id,
            seller_id: self.seller.id,
            courier_id: courier,
            items,
            subtotal,
            delivery_fee: 15_000,
            total: subtotal + 15_000,
            platform_commission: split.platform_commission,
            seller_amount: split.seller_amount,
            delivery_location: GeoPoint { lat: 41.33, lng: 69.25 },
            delivery_address: Some("Amir Temur 1".to_string()),
            payment_method: PaymentMethod::Cash,
            notes: None,
            status,
            delivery_code: courier.map(|_| generate_delivery_code()),
            created_at: now,
            updated_at: now,
        };
        self.state.repo.insert_order(order.clone()).await.unwrap();
        order
    }

    pub async fn order(&self, id: OrderId) -> Order {
        self.state.repo.order_by_id(id).await.unwrap().unwrap()
    }

    pub async fn wait_for_pushes(&self, count: usize) {
        self.push.wait_for(count).await;
    }

    pub fn pushed_to(&self) -> Vec<UserId> {
        self.push.recipients()
    }
}

fn memory() -> Arc<dyn Repository> {
    Arc::new(MemoryStore::new())
}
