use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::orders::repo::{LineItem, Order, OrderState};

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub deal_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LineItemView {
    pub id: Uuid,
    pub deal_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
    pub total_price: Decimal,
}

impl From<&LineItem> for LineItemView {
    fn from(item: &LineItem) -> Self {
        Self {
            id: item.id,
            deal_id: item.deal_id,
            quantity: item.quantity,
            price: item.price,
            total_price: item.total_price(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    /// Opaque identifier the client stores and replays via `X-Cart-Token`.
    pub cart_token: Uuid,
    pub items: Vec<LineItemView>,
    pub total: Decimal,
}

impl CartResponse {
    pub fn new(cart_token: Uuid, line_items: &[LineItem]) -> Self {
        let items: Vec<LineItemView> = line_items.iter().map(LineItemView::from).collect();
        let total = items.iter().map(|i| i.total_price).sum();
        Self {
            cart_token,
            items,
            total,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub state: OrderState,
    pub items: Vec<LineItemView>,
    pub total: Decimal,
}

impl OrderResponse {
    pub fn new(order: &Order, line_items: &[LineItem]) -> Self {
        let items: Vec<LineItemView> = line_items.iter().map(LineItemView::from).collect();
        let total = items.iter().map(|i| i.total_price).sum();
        Self {
            id: order.id,
            state: order.state,
            items,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn item(quantity: i32, cents: i64) -> LineItem {
        LineItem {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            deal_id: Uuid::new_v4(),
            quantity,
            price: Decimal::new(cents, 2),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn cart_total_sums_line_totals() {
        let items = vec![item(2, 1_050), item(1, 499)];
        let cart = CartResponse::new(Uuid::new_v4(), &items);
        assert_eq!(cart.total, Decimal::new(2_599, 2)); // 2*10.50 + 4.99
    }

    #[test]
    fn empty_cart_totals_zero() {
        let cart = CartResponse::new(Uuid::new_v4(), &[]);
        assert_eq!(cart.total, Decimal::ZERO);
        assert!(cart.items.is_empty());
    }
}
