//! Who may move an order into which status.
//!
//! | role       | accepted, ready | assigned       | picked_up              | in_transit, delivered | rejected, cancelled |
//! |------------|-----------------|----------------|------------------------|-----------------------|---------------------|
//! | seller     | own orders      | own orders     | -                      | -                     | own orders          |
//! | courier    | -               | claim          | assigned or claim      | assigned courier      | -                   |
//! | admin      | -               | staff          | -                      | -                     | staff               |
//! | dispatcher | -               | staff          | -                      | -                     | -                   |
//! | buyer      | -               | -              | -                      | -                     | -                   |
//!
//! Sellers and staff reach `assigned` only with a chosen courier (dispatch). Carrying
//! the order (`picked_up` onwards) belongs to couriers alone.

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::models::user::{Actor, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Denied,
    SellerOfOrder,
    AssignedCourier,
    /// A courier taking an order that has no courier yet.
    Claim,
    AssignedCourierOrClaim,
    Staff,
}

pub fn capability(role: Role, target: OrderStatus) -> Capability {
    use OrderStatus::*;

    match (role, target) {
        (Role::Seller, Accepted | Ready | Assigned | Rejected | Cancelled) => {
            Capability::SellerOfOrder
        }
        (Role::Courier, Assigned) => Capability::Claim,
        (Role::Courier, PickedUp) => Capability::AssignedCourierOrClaim,
        (Role::Courier, InTransit | Delivered) => Capability::AssignedCourier,
        (Role::Admin, Assigned | Rejected | Cancelled) => Capability::Staff,
        (Role::Dispatcher, Assigned) => Capability::Staff,
        _ => Capability::Denied,
    }
}

/// Checks `actor` against `order` for the given capability.
///
/// A claim on an order that already has a courier is a state conflict rather than a
/// permission problem, so it reports `InvalidState`.
pub fn authorize(capability: Capability, actor: &Actor, order: &Order) -> Result<(), AppError> {
    let is_assigned_courier = order.courier_id == Some(actor.id);

    match capability {
        Capability::Denied => Err(AppError::Forbidden(format!(
            "{:?} may not perform this transition",
            actor.role
        ))),
        Capability::SellerOfOrder if order.seller_id == actor.id => Ok(()),
        Capability::SellerOfOrder => Err(AppError::Forbidden(
            "only the order's seller may do this".to_string(),
        )),
        Capability::AssignedCourier if is_assigned_courier => Ok(()),
        Capability::AssignedCourier => Err(AppError::Forbidden(
            "order is not assigned to this courier".to_string(),
        )),
        Capability::Claim if order.courier_id.is_none() => Ok(()),
        Capability::Claim => Err(AppError::InvalidState(format!(
            "order {} already assigned",
            order.id
        ))),
        Capability::AssignedCourierOrClaim if is_assigned_courier || order.courier_id.is_none() => {
            Ok(())
        }
        Capability::AssignedCourierOrClaim => Err(AppError::Forbidden(
            "order is assigned to another courier".to_string(),
        )),
        Capability::Staff => Ok(()),
    }
}
