use serde_json::json;
use tracing::info;

use crate::engine::authorization::{Capability, authorize, capability};
use crate::engine::queue::try_enqueue_dispatch;
use crate::error::AppError;
use crate::models::order::{Order, OrderId, OrderStatus, generate_delivery_code};
use crate::models::user::{Actor, Role, UserId};
use crate::realtime::{Envelope, Notification};
use crate::state::AppState;
use crate::store::{CasOutcome, ExpectedOrderState, StatusUpdate};

/// Moves an order to `new_status` on behalf of `actor`.
///
/// A courier moving an unassigned order to `assigned` or `picked_up` claims it.
/// `delivered` needs the buyer's code; see [`confirm_delivery`].
pub async fn transition(
    state: &AppState,
    order_id: OrderId,
    new_status: OrderStatus,
    actor: &Actor,
) -> Result<Order, AppError> {
    apply(state, order_id, new_status, actor, None, None).await
}

/// Assigns a chosen courier to a ready order. Used by dispatch.
pub async fn assign_courier(
    state: &AppState,
    order_id: OrderId,
    courier_id: UserId,
    actor: &Actor,
) -> Result<Order, AppError> {
    apply(state, order_id, OrderStatus::Assigned, actor, Some(courier_id), None).await
}

/// Marks an order delivered once the courier presents the code the buyer was given.
pub async fn confirm_delivery(
    state: &AppState,
    order_id: OrderId,
    delivery_code: Option<&str>,
    actor: &Actor,
) -> Result<Order, AppError> {
    apply(state, order_id, OrderStatus::Delivered, actor, None, delivery_code).await
}

async fn apply(
    state: &AppState,
    order_id: OrderId,
    target: OrderStatus,
    actor: &Actor,
    assignee: Option<UserId>,
    delivery_code: Option<&str>,
) -> Result<Order, AppError> {
    let order = state
        .repo
        .order_by_id(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    let capability = capability(actor.role, target);
    if capability == Capability::Denied {
        return Err(AppError::Forbidden(format!(
            "{:?} may not move orders to {target}",
            actor.role
        )));
    }

    if order.status.is_terminal() {
        return Err(AppError::InvalidState(format!(
            "order {order_id} is {} and cannot change",
            order.status
        )));
    }
    if !order.status.can_transition_to(target) {
        return Err(AppError::InvalidState(format!(
            "cannot move order {order_id} from {} to {target}",
            order.status
        )));
    }

    authorize(capability, actor, &order)?;

    if target == OrderStatus::Delivered && !order.accepts_delivery_code(delivery_code) {
        let reason = if delivery_code.is_some() {
            "delivery code does not match"
        } else {
            "a delivery code is required to mark the order delivered"
        };
        return Err(AppError::InvalidArgument(reason.to_string()));
    }

    let courier_id = courier_to_stamp(state, &order, target, actor, assignee).await?;

    let outcome = state
        .repo
        .compare_and_set_status(
            order_id,
            ExpectedOrderState::from(&order),
            StatusUpdate {
                status: target,
                courier_id,
                delivery_code: courier_id.map(|_| generate_delivery_code()),
            },
        )
        .await?;

    let updated = match outcome {
        CasOutcome::Applied(updated) => updated,
        CasOutcome::Conflict { current } => {
            return Err(AppError::InvalidState(format!(
                "order {order_id} changed concurrently (now {})",
                current.status
            )));
        }
    };

    state
        .metrics
        .order_transitions_total
        .with_label_values(&[target.as_str()])
        .inc();

    info!(
        order_id = %order_id,
        from = %order.status,
        to = %target,
        actor = %actor.id,
        courier_id = ?updated.courier_id,
        "order transitioned"
    );

    let newly_taken = order.courier_id.is_none() && updated.courier_id.is_some();
    notify_participants(state, &updated, newly_taken);

    if target == OrderStatus::Ready && state.config.auto_dispatch {
        try_enqueue_dispatch(state, order_id);
    }

    Ok(updated)
}

/// Which courier, if any, the write should stamp onto the order.
async fn courier_to_stamp(
    state: &AppState,
    order: &Order,
    target: OrderStatus,
    actor: &Actor,
    assignee: Option<UserId>,
) -> Result<Option<UserId>, AppError> {
    let claiming = order.courier_id.is_none()
        && matches!(target, OrderStatus::Assigned | OrderStatus::PickedUp);

    if !claiming {
        return Ok(None);
    }

    if actor.role == Role::Courier {
        return match assignee {
            None => Ok(Some(actor.id)),
            Some(id) if id == actor.id => Ok(Some(id)),
            Some(_) => Err(AppError::Forbidden(
                "couriers may only assign themselves".to_string(),
            )),
        };
    }

    let courier_id = assignee.ok_or_else(|| {
        AppError::InvalidArgument("a courier must be chosen to assign this order".to_string())
    })?;

    let courier = state
        .repo
        .user_by_id(courier_id)
        .await?
        .filter(|user| user.role == Role::Courier)
        .ok_or_else(|| AppError::NotFound(format!("courier {courier_id} not found")))?;

    Ok(Some(courier.id))
}

fn buyer_message(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Your order has been placed",
        OrderStatus::Accepted => "The seller accepted your order",
        OrderStatus::Ready => "Your order is packed and waiting for a courier",
        OrderStatus::Assigned => "A courier has been assigned to your order",
        OrderStatus::PickedUp => "The courier picked up your order",
        OrderStatus::InTransit => "Your order is on its way",
        OrderStatus::Delivered => "Your order has been delivered",
        OrderStatus::Rejected => "The seller could not accept your order",
        OrderStatus::Cancelled => "Your order was cancelled",
    }
}

fn order_notification(order: &Order, body: &str) -> Envelope {
    Envelope::Notification(Notification::new(
        "Order update",
        body,
        json!({
            "order_id": order.id,
            "status": order.status,
            "courier_id": order.courier_id,
        }),
    ))
}

fn delivery_code_notification(order: &Order, code: &str) -> Envelope {
    Envelope::Notification(Notification::new(
        "Order update",
        format!(
            "{}. Give the courier code {code} when your order arrives",
            buyer_message(order.status)
        ),
        json!({
            "order_id": order.id,
            "status": order.status,
            "courier_id": order.courier_id,
            "delivery_code": code,
        }),
    ))
}

/// Best effort; routing never fails the transition.
fn notify_participants(state: &AppState, order: &Order, newly_taken: bool) {
    let to_buyer = match (&order.delivery_code, newly_taken) {
        (Some(code), true) => delivery_code_notification(order, code),
        _ => order_notification(order, buyer_message(order.status)),
    };
    state.notifier.route(order.buyer_id, to_buyer);

    if order.status == OrderStatus::PickedUp {
        state.notifier.route(
            order.seller_id,
            order_notification(order, "A courier collected the order from you"),
        );
    }
}
