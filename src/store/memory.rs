use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::assignment::Assignment;
use crate::models::courier::CourierLocation;
use crate::models::message::ChatMessage;
use crate::models::order::{Order, OrderId};
use crate::models::user::{Role, User, UserId};
use crate::store::{
    AssignmentRepository, CasOutcome, CourierRepository, ExpectedOrderState, MessageRepository,
    OrderFilter, OrderRepository, SettingsRepository, StatusUpdate, UserRepository,
};

/// In-process store. Each table is a `DashMap`; per-row atomicity comes from holding the
/// row's shard lock for the duration of a read-modify-write.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<UserId, User>,
    orders: DashMap<OrderId, Order>,
    locations: DashMap<UserId, CourierLocation>,
    messages: DashMap<u64, ChatMessage>,
    message_seq: AtomicU64,
    settings: DashMap<String, String>,
    assignments: DashMap<Uuid, Assignment>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_messages<F>(&self, predicate: F) -> Vec<ChatMessage>
    where
        F: Fn(&ChatMessage) -> bool,
    {
        let mut matching: Vec<(u64, ChatMessage)> = self
            .messages
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        matching.sort_by_key(|(seq, _)| *seq);
        matching.into_iter().map(|(_, message)| message).collect()
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert_order(&self, order: Order) -> Result<(), AppError> {
        if self.orders.contains_key(&order.id) {
            return Err(AppError::InvalidState(format!("order {} already exists", order.id)));
        }
        self.orders.insert(order.id, order);
        Ok(())
    }

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, AppError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn orders_matching(&self, filter: OrderFilter) -> Result<Vec<Order>, AppError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn compare_and_set_status(
        &self,
        id: OrderId,
        expected: ExpectedOrderState,
        update: StatusUpdate,
    ) -> Result<CasOutcome, AppError> {
        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        if ExpectedOrderState::from(&*order) != expected {
            return Ok(CasOutcome::Conflict {
                current: order.clone(),
            });
        }

        order.status = update.status;
        if order.courier_id.is_none() && update.courier_id.is_some() {
            order.courier_id = update.courier_id;
            order.delivery_code = update.delivery_code;
        }
        order.updated_at = Utc::now();

        Ok(CasOutcome::Applied(order.clone()))
    }
}

#[async_trait]
impl CourierRepository for MemoryStore {
    async fn upsert_location(&self, location: CourierLocation) -> Result<(), AppError> {
        self.locations.insert(location.courier_id, location);
        Ok(())
    }

    async fn location(&self, courier_id: UserId) -> Result<Option<CourierLocation>, AppError> {
        Ok(self.locations.get(&courier_id).map(|entry| entry.value().clone()))
    }

    async fn dispatch_candidates(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<CourierLocation>, AppError> {
        let fresh: Vec<CourierLocation> = self
            .locations
            .iter()
            .filter(|entry| entry.is_online && entry.is_fresh(since))
            .map(|entry| entry.value().clone())
            .collect();

        Ok(fresh
            .into_iter()
            .filter(|candidate| {
                self.users
                    .get(&candidate.courier_id)
                    .map(|user| user.role == Role::Courier && user.is_verified)
                    .unwrap_or(false)
            })
            .collect())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert_user(&self, user: User) -> Result<(), AppError> {
        self.users.insert(user.id, user);
        Ok(())
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, AppError> {
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }

    async fn set_user_location(&self, id: UserId, location: GeoPoint) -> Result<User, AppError> {
        let mut user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
        user.location = Some(location);
        Ok(user.clone())
    }

    async fn set_verified(&self, id: UserId, verified: bool) -> Result<User, AppError> {
        let mut user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
        user.is_verified = verified;
        Ok(user.clone())
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn insert_message(&self, message: ChatMessage) -> Result<(), AppError> {
        let seq = self.message_seq.fetch_add(1, Ordering::SeqCst);
        self.messages.insert(seq, message);
        Ok(())
    }

    async fn thread(&self, a: UserId, b: UserId) -> Result<Vec<ChatMessage>, AppError> {
        Ok(self.sorted_messages(|m| {
            (m.sender_id == a && m.receiver_id == b) || (m.sender_id == b && m.receiver_id == a)
        }))
    }

    async fn mark_read(&self, sender: UserId, receiver: UserId) -> Result<usize, AppError> {
        let mut changed = 0;
        for mut entry in self.messages.iter_mut() {
            let message = entry.value_mut();
            if message.sender_id == sender && message.receiver_id == receiver && !message.is_read {
                message.is_read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn messages_involving(&self, user: UserId) -> Result<Vec<ChatMessage>, AppError> {
        Ok(self.sorted_messages(|m| m.sender_id == user || m.receiver_id == user))
    }

    async fn unread_count(&self, receiver: UserId) -> Result<usize, AppError> {
        Ok(self
            .messages
            .iter()
            .filter(|entry| entry.receiver_id == receiver && !entry.is_read)
            .count())
    }
}

#[async_trait]
impl SettingsRepository for MemoryStore {
    async fn setting(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.settings.get(key).map(|entry| entry.value().clone()))
    }

    async fn put_setting(&self, key: &str, value: String) -> Result<(), AppError> {
        self.settings.insert(key.to_string(), value);
        Ok(())
    }
}

#[async_trait]
impl AssignmentRepository for MemoryStore {
    async fn record_assignment(&self, assignment: Assignment) -> Result<(), AppError> {
        self.assignments.insert(assignment.id, assignment);
        Ok(())
    }

    async fn assignments(&self) -> Result<Vec<Assignment>, AppError> {
        let mut assignments: Vec<Assignment> = self
            .assignments
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        assignments.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at));
        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::MemoryStore;
    use crate::geo::GeoPoint;
    use crate::models::courier::CourierLocation;
    use crate::models::order::{Order, OrderStatus, PaymentMethod};
    use crate::models::user::{Role, User};
    use crate::store::{
        CasOutcome, CourierRepository, ExpectedOrderState, OrderRepository, StatusUpdate,
        UserRepository,
    };

    fn ready_order() -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            courier_id: None,
            items: Vec::new(),
            subtotal: 0,
            delivery_fee: 0,
            total: 0,
            platform_commission: 0,
            seller_amount: 0,
            delivery_location: GeoPoint { lat: 41.3, lng: 69.2 },
            delivery_address: None,
            payment_method: PaymentMethod::Cash,
            notes: None,
            status: OrderStatus::Ready,
            delivery_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn cas_rejects_stale_expectation() {
        let store = MemoryStore::new();
        let order = ready_order();
        store.insert_order(order.clone()).await.unwrap();

        let expected = ExpectedOrderState::from(&order);
        let first = store
            .compare_and_set_status(
                order.id,
                expected,
                StatusUpdate {
                    status: OrderStatus::Assigned,
                    courier_id: Some(Uuid::from_u128(1)),
                    delivery_code: Some("111111".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(matches!(first, CasOutcome::Applied(_)));

        let second = store
            .compare_and_set_status(
                order.id,
                expected,
                StatusUpdate {
                    status: OrderStatus::Assigned,
                    courier_id: Some(Uuid::from_u128(2)),
                    delivery_code: Some("222222".to_string()),
                },
            )
            .await
            .unwrap();

        match second {
            CasOutcome::Conflict { current } => {
                assert_eq!(current.courier_id, Some(Uuid::from_u128(1)));
                assert_eq!(current.delivery_code.as_deref(), Some("111111"));
            }
            CasOutcome::Applied(_) => panic!("stale expectation must not apply"),
        }
    }

    #[tokio::test]
    async fn cas_never_replaces_a_set_courier() {
        let store = MemoryStore::new();
        let mut order = ready_order();
        order.status = OrderStatus::Assigned;
        order.courier_id = Some(Uuid::from_u128(7));
        order.delivery_code = Some("777777".to_string());
        store.insert_order(order.clone()).await.unwrap();

        let outcome = store
            .compare_and_set_status(
                order.id,
                ExpectedOrderState::from(&order),
                StatusUpdate {
                    status: OrderStatus::PickedUp,
                    courier_id: Some(Uuid::from_u128(8)),
                    delivery_code: Some("888888".to_string()),
                },
            )
            .await
            .unwrap();

        let CasOutcome::Applied(updated) = outcome else {
            panic!("expected update to apply");
        };
        assert_eq!(updated.courier_id, Some(Uuid::from_u128(7)));
        assert_eq!(updated.delivery_code.as_deref(), Some("777777"));
        assert_eq!(updated.status, OrderStatus::PickedUp);
    }

    #[tokio::test]
    async fn candidates_exclude_stale_offline_and_unverified() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let since = now - Duration::minutes(10);

        let mut fresh = User::new("fresh", Role::Courier);
        fresh.is_verified = true;
        let mut stale = User::new("stale", Role::Courier);
        stale.is_verified = true;
        let mut offline = User::new("offline", Role::Courier);
        offline.is_verified = true;
        let unverified = User::new("unverified", Role::Courier);

        let point = GeoPoint { lat: 41.3, lng: 69.2 };
        for (user, online, age) in [
            (&fresh, true, Duration::minutes(1)),
            (&stale, true, Duration::minutes(11)),
            (&offline, false, Duration::minutes(1)),
            (&unverified, true, Duration::minutes(1)),
        ] {
            store.insert_user(user.clone()).await.unwrap();
            store
                .upsert_location(CourierLocation {
                    courier_id: user.id,
                    location: point,
                    is_online: online,
                    last_updated: now - age,
                })
                .await
                .unwrap();
        }

        let candidates = store.dispatch_candidates(since).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].courier_id, fresh.id);
    }
}
