use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::deals::repo::Deal;
use crate::error::{ApiError, ValidationErrors};
use crate::orders::repo::{Order, OrderState};
use crate::state::AppState;

/// Validate the cart against each deal's limits, then claim and place it.
pub async fn checkout(state: &AppState, cart_id: Uuid, user_id: Uuid) -> Result<Order, ApiError> {
    let order = Order::find_cart(&state.db, cart_id)
        .await?
        .ok_or(ApiError::NotFound("cart"))?;

    let line_items = Order::line_items(&state.db, order.id).await?;
    let mut errors = ValidationErrors::new();
    if line_items.is_empty() {
        errors.add_base("cart is empty");
    }
    for line_item in &line_items {
        let Some(deal) = Deal::find_by_id(&state.db, line_item.deal_id).await? else {
            errors.add_base("a deal in the cart no longer exists");
            continue;
        };
        if let Some(per_customer) = deal.maximum_purchases_per_customer {
            if line_item.quantity > per_customer {
                errors.add_base(format!(
                    "quantity for \"{}\" exceeds the per-customer limit of {}",
                    deal.title, per_customer
                ));
            }
        }
        if deal.maximum_purchases_allowed.is_some() {
            let sold = Deal::quantity_sold(&state.db, deal.id).await?;
            if i64::from(line_item.quantity) > deal.quantity_left(sold) {
                errors.add_base(format!("not enough of \"{}\" left", deal.title));
            }
        }
    }
    errors.into_result()?;

    let placed = Order::place(&state.db, order.id, user_id)
        .await?
        .ok_or_else(|| ApiError::Conflict("cart changed concurrently".into()))?;
    info!(order_id = %placed.id, %user_id, "order placed");
    Ok(placed)
}

pub async fn pay_order(state: &AppState, order_id: Uuid, user_id: Uuid) -> Result<Order, ApiError> {
    let order = Order::find_by_id(&state.db, order_id)
        .await?
        .filter(|o| o.user_id == Some(user_id))
        .ok_or(ApiError::NotFound("order"))?;
    let paid = transition(&state.db, &order, OrderState::Paid).await?;
    info!(order_id = %paid.id, "order paid");
    Ok(paid)
}

pub async fn deliver_order(db: &PgPool, order_id: Uuid) -> Result<Order, ApiError> {
    let order = Order::find_by_id(db, order_id)
        .await?
        .ok_or(ApiError::NotFound("order"))?;
    transition(db, &order, OrderState::Delivered).await
}

pub async fn cancel_order(db: &PgPool, order_id: Uuid) -> Result<Order, ApiError> {
    let order = Order::find_by_id(db, order_id)
        .await?
        .ok_or(ApiError::NotFound("order"))?;
    transition(db, &order, OrderState::Cancelled).await
}

async fn transition(db: &PgPool, order: &Order, to: OrderState) -> Result<Order, ApiError> {
    if !order.state.can_transition_to(to) {
        return Err(ApiError::State(format!(
            "cannot move order from {:?} to {:?}",
            order.state, to
        )));
    }
    Order::transition(db, order.id, order.state, to)
        .await?
        .ok_or_else(|| ApiError::Conflict("order changed concurrently".into()))
}
