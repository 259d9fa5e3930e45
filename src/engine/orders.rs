use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{GeoPoint, haversine_km};
use crate::models::order::{Order, OrderId, OrderItem, OrderStatus, PaymentMethod};
use crate::models::user::{Actor, Role, UserId};
use crate::pricing::{commission_split, resolve_base_fee, resolve_commission_rate};
use crate::realtime::{Envelope, Notification};
use crate::state::AppState;
use crate::store::OrderFilter;

/// Largest accepted unit price, in currency minor units.
pub const MAX_UNIT_PRICE: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub seller_id: UserId,
    pub items: Vec<OrderItem>,
    pub delivery_location: GeoPoint,
    #[serde(default)]
    pub delivery_address: Option<String>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Places a new order in `pending` on behalf of a buyer.
pub async fn submit_order(
    state: &AppState,
    actor: &Actor,
    request: NewOrder,
) -> Result<Order, AppError> {
    if actor.role != Role::Buyer {
        return Err(AppError::Forbidden("only buyers can place orders".to_string()));
    }

    if request.items.is_empty() {
        return Err(AppError::InvalidArgument(
            "an order needs at least one item".to_string(),
        ));
    }
    for item in &request.items {
        if item.quantity == 0 {
            return Err(AppError::InvalidArgument(format!(
                "quantity for product {} must be positive",
                item.product_id
            )));
        }
        if item.unit_price < 0 {
            return Err(AppError::InvalidArgument(format!(
                "price for product {} cannot be negative",
                item.product_id
            )));
        }
        if item.unit_price > MAX_UNIT_PRICE {
            return Err(AppError::InvalidArgument(format!(
                "price for product {} exceeds {MAX_UNIT_PRICE}",
                item.product_id
            )));
        }
    }
    let delivery_location = request.delivery_location.validated()?;

    let subtotal = request
        .items
        .iter()
        .try_fold(0i64, |acc, item| {
            item.unit_price
                .checked_mul(i64::from(item.quantity))
                .and_then(|line| acc.checked_add(line))
        })
        .ok_or_else(|| AppError::InvalidArgument("order total overflows".to_string()))?;

    let seller = state
        .repo
        .user_by_id(request.seller_id)
        .await?
        .filter(|user| user.role == Role::Seller)
        .ok_or_else(|| AppError::NotFound(format!("seller {} not found", request.seller_id)))?;

    let base_fee = resolve_base_fee(state).await;
    let delivery_fee = match &seller.location {
        Some(origin) => state
            .pricing
            .delivery_fee(haversine_km(origin, &delivery_location), base_fee),
        None => base_fee,
    };
    let total = subtotal
        .checked_add(delivery_fee)
        .ok_or_else(|| AppError::InvalidArgument("order total overflows".to_string()))?;

    let split = commission_split(subtotal, resolve_commission_rate(state).await);

    let now = Utc::now();
    let order = Order {
        id: Uuid::new_v4(),
        buyer_id: actor.id,
        seller_id: seller.id,
        courier_id: None,
        items: request.items,
        subtotal,
        delivery_fee,
        total,
        platform_commission: split.platform_commission,
        seller_amount: split.seller_amount,
        delivery_location,
        delivery_address: request.delivery_address,
        payment_method: request.payment_method,
        notes: request.notes,
        status: OrderStatus::Pending,
        delivery_code: None,
        created_at: now,
        updated_at: now,
    };

    state.repo.insert_order(order.clone()).await?;

    info!(
        order_id = %order.id,
        buyer_id = %order.buyer_id,
        seller_id = %order.seller_id,
        total = order.total,
        platform_commission = order.platform_commission,
        "order submitted"
    );

    state.notifier.route(
        order.seller_id,
        Envelope::Notification(Notification::new(
            "New order",
            format!("New order for {} items", order.items.len()),
            json!({ "order_id": order.id, "status": order.status }),
        )),
    );

    Ok(order)
}

pub async fn list_orders(state: &AppState, actor: &Actor) -> Result<Vec<Order>, AppError> {
    let filter = match actor.role {
        Role::Admin | Role::Dispatcher => OrderFilter::All,
        Role::Seller => OrderFilter::Seller(actor.id),
        Role::Courier => OrderFilter::Courier(actor.id),
        Role::Buyer => OrderFilter::Buyer(actor.id),
    };
    state.repo.orders_matching(filter).await
}

/// Ready orders nobody has taken yet.
pub async fn available_orders(state: &AppState, actor: &Actor) -> Result<Vec<Order>, AppError> {
    match actor.role {
        Role::Courier | Role::Admin | Role::Dispatcher => {
            state.repo.orders_matching(OrderFilter::Available).await
        }
        _ => Err(AppError::Forbidden(
            "only couriers can browse available orders".to_string(),
        )),
    }
}

pub async fn order_for_viewer(
    state: &AppState,
    order_id: OrderId,
    actor: &Actor,
) -> Result<Order, AppError> {
    let order = state
        .repo
        .order_by_id(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    let courier_browsing = actor.role == Role::Courier && order.is_dispatchable();
    if actor.role.is_staff() || order.is_participant(actor.id) || courier_browsing {
        Ok(order)
    } else {
        Err(AppError::Forbidden("access denied".to_string()))
    }
}

/// The delivery code of an order, for its buyer to hand to the courier at the door.
pub async fn delivery_code_for(
    state: &AppState,
    order_id: OrderId,
    actor: &Actor,
) -> Result<String, AppError> {
    let order = state
        .repo
        .order_by_id(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    if order.buyer_id != actor.id && actor.role != Role::Admin {
        return Err(AppError::Forbidden(
            "only the buyer can see the delivery code".to_string(),
        ));
    }

    order.delivery_code.ok_or_else(|| {
        AppError::InvalidState(format!("no courier has taken order {order_id} yet"))
    })
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{
        MAX_UNIT_PRICE, NewOrder, available_orders, delivery_code_for, list_orders,
        order_for_viewer, submit_order,
    };
    use crate::error::AppError;
    use crate::geo::GeoPoint;
    use crate::models::order::{OrderItem, OrderStatus, PaymentMethod};
    use crate::models::user::{Actor, Role};
    use crate::test_support::Fixture;

    fn new_order(seller_id: Uuid, delivery: GeoPoint) -> NewOrder {
        NewOrder {
            seller_id,
            items: vec![
                OrderItem {
                    product_id: Uuid::new_v4(),
                    quantity: 3,
                    unit_price: 10_000,
                },
                OrderItem {
                    product_id: Uuid::new_v4(),
                    quantity: 1,
                    unit_price: 5_000,
                },
            ],
            delivery_location: delivery,
            delivery_address: Some("Chilonzor 9".to_string()),
            payment_method: PaymentMethod::Payme,
            notes: Some("ring twice".to_string()),
        }
    }

    #[tokio::test]
    async fn buyer_submits_pending_order_with_distance_fee() {
        let fx = Fixture::new().await;
        // ~5 km north of the seller
        let delivery = GeoPoint {
            lat: 41.3 + 5.0 / 111.195,
            lng: 69.2,
        };

        let order = submit_order(&fx.state, &fx.buyer_actor(), new_order(fx.seller.id, delivery))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.courier_id.is_none());
        assert_eq!(order.subtotal, 35_000);
        assert_eq!(order.delivery_fee, 19_000);
        assert_eq!(order.total, 54_000);
        assert_eq!(order.platform_commission, 3_500);
        assert_eq!(order.seller_amount, 31_500);
        assert!(order.delivery_code.is_none());
        assert_eq!(order.buyer_id, fx.buyer.id);

        fx.wait_for_pushes(1).await;
        assert_eq!(fx.pushed_to(), vec![fx.seller.id]);
    }

    #[tokio::test]
    async fn base_fee_setting_overrides_default() {
        let fx = Fixture::new().await;
        fx.state
            .repo
            .put_setting("courier_base_fee", "20000".to_string())
            .await
            .unwrap();

        let order = submit_order(
            &fx.state,
            &fx.buyer_actor(),
            new_order(fx.seller.id, GeoPoint { lat: 41.301, lng: 69.2 }),
        )
        .await
        .unwrap();
        assert_eq!(order.delivery_fee, 20_000);
    }

    #[tokio::test]
    async fn commission_setting_overrides_default() {
        let fx = Fixture::new().await;
        fx.state
            .repo
            .put_setting("platform_commission_rate", "0.2".to_string())
            .await
            .unwrap();

        let order = submit_order(
            &fx.state,
            &fx.buyer_actor(),
            new_order(fx.seller.id, GeoPoint { lat: 41.301, lng: 69.2 }),
        )
        .await
        .unwrap();
        assert_eq!(order.platform_commission, 7_000);
        assert_eq!(order.seller_amount, 28_000);
    }

    #[tokio::test]
    async fn garbage_commission_setting_falls_back_to_config() {
        let fx = Fixture::new().await;
        fx.state
            .repo
            .put_setting("platform_commission_rate", "2.5".to_string())
            .await
            .unwrap();

        let order = submit_order(
            &fx.state,
            &fx.buyer_actor(),
            new_order(fx.seller.id, GeoPoint { lat: 41.301, lng: 69.2 }),
        )
        .await
        .unwrap();
        assert_eq!(order.platform_commission, 3_500);
    }

    #[tokio::test]
    async fn huge_unit_price_is_rejected_instead_of_overflowing() {
        let fx = Fixture::new().await;
        let nearby = GeoPoint { lat: 41.3009, lng: 69.2 };

        let mut request = new_order(fx.seller.id, nearby);
        request.items = vec![OrderItem {
            product_id: Uuid::new_v4(),
            quantity: 1,
            unit_price: i64::MAX - 1,
        }];
        assert!(matches!(
            submit_order(&fx.state, &fx.buyer_actor(), request).await,
            Err(AppError::InvalidArgument(_))
        ));

        let mut request = new_order(fx.seller.id, nearby);
        request.items = vec![OrderItem {
            product_id: Uuid::new_v4(),
            quantity: u32::MAX,
            unit_price: MAX_UNIT_PRICE,
        }];
        assert!(matches!(
            submit_order(&fx.state, &fx.buyer_actor(), request).await,
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn delivery_fee_pushing_total_past_i64_is_rejected() {
        let fx = Fixture::new().await;
        let mut request = new_order(fx.seller.id, GeoPoint { lat: 41.3009, lng: 69.2 });
        // Subtotal lands exactly on i64::MAX, so only adding the fee overflows.
        request.items = vec![
            OrderItem {
                product_id: Uuid::new_v4(),
                quantity: 9_223_372,
                unit_price: MAX_UNIT_PRICE,
            },
            OrderItem {
                product_id: Uuid::new_v4(),
                quantity: 36,
                unit_price: 1_023_743_772,
            },
            OrderItem {
                product_id: Uuid::new_v4(),
                quantity: 15,
                unit_price: 1,
            },
        ];

        assert!(matches!(
            submit_order(&fx.state, &fx.buyer_actor(), request).await,
            Err(AppError::InvalidArgument(_))
        ));
        assert!(list_orders(&fx.state, &fx.buyer_actor()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_the_buyer_reads_the_delivery_code() {
        let fx = Fixture::new().await;
        let courier = fx.courier(41.3, 69.2).await;
        let waiting = fx.order_with_status(OrderStatus::Ready, None).await;
        let taken = fx
            .order_with_status(OrderStatus::Assigned, Some(courier.id))
            .await;

        assert!(matches!(
            delivery_code_for(&fx.state, waiting.id, &fx.buyer_actor()).await,
            Err(AppError::InvalidState(_))
        ));

        let code = delivery_code_for(&fx.state, taken.id, &fx.buyer_actor())
            .await
            .unwrap();
        assert_eq!(Some(code), taken.delivery_code);

        for outsider in [fx.seller_actor(), Actor::from(&courier)] {
            assert!(matches!(
                delivery_code_for(&fx.state, taken.id, &outsider).await,
                Err(AppError::Forbidden(_))
            ));
        }
    }

    #[tokio::test]
    async fn rejects_invalid_submissions() {
        let fx = Fixture::new().await;
        let buyer = fx.buyer_actor();
        let here = GeoPoint { lat: 41.3, lng: 69.2 };

        let mut empty = new_order(fx.seller.id, here);
        empty.items.clear();
        assert!(matches!(
            submit_order(&fx.state, &buyer, empty).await,
            Err(AppError::InvalidArgument(_))
        ));

        let mut zero_qty = new_order(fx.seller.id, here);
        zero_qty.items[0].quantity = 0;
        assert!(matches!(
            submit_order(&fx.state, &buyer, zero_qty).await,
            Err(AppError::InvalidArgument(_))
        ));

        let off_map = new_order(fx.seller.id, GeoPoint { lat: 120.0, lng: 0.0 });
        assert!(matches!(
            submit_order(&fx.state, &buyer, off_map).await,
            Err(AppError::InvalidArgument(_))
        ));

        let not_a_seller = new_order(fx.buyer.id, here);
        assert!(matches!(
            submit_order(&fx.state, &buyer, not_a_seller).await,
            Err(AppError::NotFound(_))
        ));

        assert!(matches!(
            submit_order(&fx.state, &fx.seller_actor(), new_order(fx.seller.id, here)).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn listings_are_scoped_by_role() {
        let fx = Fixture::new().await;
        let courier = fx.courier(41.3, 69.2).await;
        let other_courier = fx.courier(41.4, 69.2).await;

        let pending = fx.order_with_status(OrderStatus::Pending, None).await;
        let ready = fx.order_with_status(OrderStatus::Ready, None).await;
        let mine = fx
            .order_with_status(OrderStatus::Assigned, Some(courier.id))
            .await;
        let theirs = fx
            .order_with_status(OrderStatus::PickedUp, Some(other_courier.id))
            .await;

        let courier_view: Vec<Uuid> = list_orders(&fx.state, &Actor::from(&courier))
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert!(courier_view.contains(&ready.id));
        assert!(courier_view.contains(&mine.id));
        assert!(!courier_view.contains(&pending.id));
        assert!(!courier_view.contains(&theirs.id));

        assert_eq!(list_orders(&fx.state, &fx.buyer_actor()).await.unwrap().len(), 4);
        assert_eq!(list_orders(&fx.state, &fx.seller_actor()).await.unwrap().len(), 4);

        let stranger = fx.user("other buyer", Role::Buyer).await;
        assert!(list_orders(&fx.state, &Actor::from(&stranger)).await.unwrap().is_empty());

        let available = available_orders(&fx.state, &Actor::from(&courier))
            .await
            .unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, ready.id);
        assert!(matches!(
            available_orders(&fx.state, &fx.buyer_actor()).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn only_participants_and_staff_see_an_order() {
        let fx = Fixture::new().await;
        let order = fx.order_with_status(OrderStatus::Accepted, None).await;

        assert!(order_for_viewer(&fx.state, order.id, &fx.buyer_actor()).await.is_ok());
        assert!(order_for_viewer(&fx.state, order.id, &Actor::new(Uuid::new_v4(), Role::Admin)).await.is_ok());

        let stranger = Actor::new(Uuid::new_v4(), Role::Buyer);
        assert!(matches!(
            order_for_viewer(&fx.state, order.id, &stranger).await,
            Err(AppError::Forbidden(_))
        ));
    }
}
