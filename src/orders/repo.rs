use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::deals::repo::Deal;

/// Order lifecycle. `Paid` and `Delivered` count as completed; everything
/// sold is summed over those two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Cart,
    Placed,
    Paid,
    Delivered,
    Cancelled,
}

impl OrderState {
    pub fn is_completed(self) -> bool {
        matches!(self, OrderState::Paid | OrderState::Delivered)
    }

    /// Legal moves: cart → placed → paid → delivered, with cancellation
    /// allowed from placed or paid.
    pub fn can_transition_to(self, next: OrderState) -> bool {
        use OrderState::*;
        matches!(
            (self, next),
            (Cart, Placed) | (Placed, Paid) | (Paid, Delivered) | (Placed, Cancelled) | (Paid, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub state: OrderState,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LineItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub deal_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl LineItem {
    pub fn total_price(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

const ORDER_COLUMNS: &str = "id, user_id, state, created_at, updated_at";
const LINE_ITEM_COLUMNS: &str = "id, order_id, deal_id, quantity, price, created_at, updated_at";

impl Order {
    pub async fn create_cart(db: &PgPool) -> anyhow::Result<Order> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "INSERT INTO orders DEFAULT VALUES RETURNING {ORDER_COLUMNS}"
        ))
        .fetch_one(db)
        .await?;
        Ok(order)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(order)
    }

    /// The cart an opaque token points at, if it still is one.
    pub async fn find_cart(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND state = 'cart'"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(order)
    }

    /// Create-or-bump: the unique (order_id, deal_id) pair turns a repeat
    /// add into a quantity increment, never a duplicate row.
    pub async fn add_deal(db: &PgPool, order_id: Uuid, deal: &Deal) -> anyhow::Result<LineItem> {
        let line_item = sqlx::query_as::<_, LineItem>(&format!(
            "INSERT INTO line_items (order_id, deal_id, quantity, price)
             VALUES ($1, $2, 1, $3)
             ON CONFLICT (order_id, deal_id)
             DO UPDATE SET quantity = line_items.quantity + 1, updated_at = now()
             RETURNING {LINE_ITEM_COLUMNS}"
        ))
        .bind(order_id)
        .bind(deal.id)
        .bind(deal.price)
        .fetch_one(db)
        .await?;
        Ok(line_item)
    }

    pub async fn line_items(db: &PgPool, order_id: Uuid) -> anyhow::Result<Vec<LineItem>> {
        let items = sqlx::query_as::<_, LineItem>(&format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM line_items
             WHERE order_id = $1 ORDER BY created_at ASC"
        ))
        .bind(order_id)
        .fetch_all(db)
        .await?;
        Ok(items)
    }

    /// Guarded state change; the WHERE clause is the arbiter under
    /// concurrent transitions. None means the order was not in `from`.
    pub async fn transition(
        db: &PgPool,
        id: Uuid,
        from: OrderState,
        to: OrderState,
    ) -> anyhow::Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders SET state = $3, updated_at = now()
             WHERE id = $1 AND state = $2
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(db)
        .await?;
        Ok(order)
    }

    /// Checkout's atomic step: claim the cart for a user and place it.
    pub async fn place(db: &PgPool, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders SET user_id = $2, state = 'placed', updated_at = now()
             WHERE id = $1 AND state = 'cart'
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(order)
    }

    pub async fn for_deal(db: &PgPool, deal_id: Uuid) -> anyhow::Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT DISTINCT o.id, o.user_id, o.state, o.created_at, o.updated_at
             FROM orders o
             JOIN line_items li ON li.order_id = o.id
             WHERE li.deal_id = $1",
        )
        .bind(deal_id)
        .fetch_all(db)
        .await?;
        Ok(orders)
    }
}

impl LineItem {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<LineItem>> {
        let item = sqlx::query_as::<_, LineItem>(&format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM line_items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(item)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM line_items WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop quantity by one; the guard keeps it from going below zero.
    pub async fn decrement(db: &PgPool, id: Uuid) -> anyhow::Result<Option<LineItem>> {
        let item = sqlx::query_as::<_, LineItem>(&format!(
            "UPDATE line_items SET quantity = quantity - 1, updated_at = now()
             WHERE id = $1 AND quantity > 0
             RETURNING {LINE_ITEM_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(item)
    }

    /// Line items of a deal restricted to orders in one state.
    pub async fn for_deal_in_state(
        db: &PgPool,
        deal_id: Uuid,
        state: OrderState,
    ) -> anyhow::Result<Vec<LineItem>> {
        let items = sqlx::query_as::<_, LineItem>(
            "SELECT li.id, li.order_id, li.deal_id, li.quantity, li.price,
                    li.created_at, li.updated_at
             FROM line_items li
             JOIN orders o ON o.id = li.order_id
             WHERE li.deal_id = $1 AND o.state = $2",
        )
        .bind(deal_id)
        .bind(state)
        .fetch_all(db)
        .await?;
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_states_are_paid_and_delivered() {
        assert!(OrderState::Paid.is_completed());
        assert!(OrderState::Delivered.is_completed());
        assert!(!OrderState::Cart.is_completed());
        assert!(!OrderState::Placed.is_completed());
        assert!(!OrderState::Cancelled.is_completed());
    }

    #[test]
    fn legal_transitions_follow_the_lifecycle() {
        use OrderState::*;
        assert!(Cart.can_transition_to(Placed));
        assert!(Placed.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Delivered));
        assert!(Placed.can_transition_to(Cancelled));
        assert!(Paid.can_transition_to(Cancelled));
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        use OrderState::*;
        assert!(!Cart.can_transition_to(Paid));
        assert!(!Cart.can_transition_to(Cancelled));
        assert!(!Placed.can_transition_to(Delivered));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Placed));
        assert!(!Paid.can_transition_to(Placed));
    }

    #[test]
    fn total_price_is_price_times_quantity() {
        let item = LineItem {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            deal_id: Uuid::new_v4(),
            quantity: 3,
            price: Decimal::new(99_990, 2), // 999.90
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };
        assert_eq!(item.total_price(), Decimal::new(299_970, 2));
    }
}
