use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::jwt::AuthUser;
use crate::cart::dto::{AddItemRequest, CartResponse, LineItemView, OrderResponse};
use crate::deals::repo::Deal;
use crate::deals::rules::DealStatus;
use crate::error::ApiError;
use crate::orders::repo::{LineItem, Order};
use crate::orders::services;
use crate::state::AppState;

pub const CART_TOKEN_HEADER: &str = "x-cart-token";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(show_cart))
        .route("/cart/items", post(add_item))
        .route("/cart/checkout", post(checkout))
        .route("/line_items/:id", get(show_line_item).delete(destroy_line_item))
        .route("/line_items/:id/decrement", post(decrement_line_item))
        .route("/orders/:id/pay", post(pay_order))
}

fn cart_token(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CART_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
}

/// The order the client's token points at; a missing or stale token gets a
/// fresh empty cart whose token the client must store.
async fn find_or_create_cart(state: &AppState, headers: &HeaderMap) -> Result<Order, ApiError> {
    if let Some(id) = cart_token(headers) {
        if let Some(order) = Order::find_cart(&state.db, id).await? {
            return Ok(order);
        }
    }
    let order = Order::create_cart(&state.db).await?;
    info!(order_id = %order.id, "cart created");
    Ok(order)
}

async fn current_cart(state: &AppState, headers: &HeaderMap) -> Result<Order, ApiError> {
    let id = cart_token(headers).ok_or(ApiError::NotFound("cart"))?;
    Order::find_cart(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("cart"))
}

/// A line item is only addressable through the cart that owns it.
async fn scoped_line_item(
    state: &AppState,
    headers: &HeaderMap,
    id: Uuid,
) -> Result<LineItem, ApiError> {
    let cart = current_cart(state, headers).await?;
    LineItem::find_by_id(&state.db, id)
        .await?
        .filter(|item| item.order_id == cart.id)
        .ok_or(ApiError::NotFound("line item"))
}

#[instrument(skip(state, headers))]
async fn show_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = current_cart(&state, &headers).await?;
    let items = Order::line_items(&state.db, cart.id).await?;
    Ok(Json(CartResponse::new(cart.id, &items)))
}

#[instrument(skip(state, headers))]
async fn add_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartResponse>), ApiError> {
    let deal = Deal::find_by_id(&state.db, payload.deal_id)
        .await?
        .ok_or(ApiError::NotFound("deal"))?;
    if deal.status(OffsetDateTime::now_utc()) != DealStatus::Published {
        return Err(ApiError::State("deal is not available".into()));
    }

    let cart = find_or_create_cart(&state, &headers).await?;
    let item = Order::add_deal(&state.db, cart.id, &deal).await?;
    info!(order_id = %cart.id, deal_id = %deal.id, quantity = item.quantity, "deal added to cart");

    let items = Order::line_items(&state.db, cart.id).await?;
    Ok((StatusCode::CREATED, Json(CartResponse::new(cart.id, &items))))
}

#[instrument(skip(state, headers))]
async fn checkout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    headers: HeaderMap,
) -> Result<Json<OrderResponse>, ApiError> {
    let cart_id = cart_token(&headers).ok_or(ApiError::NotFound("cart"))?;
    let order = services::checkout(&state, cart_id, user_id).await?;
    let items = Order::line_items(&state.db, order.id).await?;
    Ok(Json(OrderResponse::new(&order, &items)))
}

#[instrument(skip(state, headers))]
async fn show_line_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<LineItemView>, ApiError> {
    let item = scoped_line_item(&state, &headers, id).await?;
    Ok(Json(LineItemView::from(&item)))
}

#[instrument(skip(state, headers))]
async fn destroy_line_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let item = scoped_line_item(&state, &headers, id).await?;
    LineItem::delete(&state.db, item.id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Quantity minus one; hitting zero destroys the row.
#[instrument(skip(state, headers))]
async fn decrement_line_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let item = scoped_line_item(&state, &headers, id).await?;
    let Some(updated) = LineItem::decrement(&state.db, item.id).await? else {
        return Err(ApiError::NotFound("line item"));
    };
    if updated.quantity == 0 {
        LineItem::delete(&state.db, updated.id).await?;
        return Ok(Json(serde_json::json!({ "removed": true })));
    }
    Ok(Json(serde_json::json!({ "line_item": LineItemView::from(&updated) })))
}

#[instrument(skip(state))]
async fn pay_order(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = services::pay_order(&state, id, user_id).await?;
    let items = Order::line_items(&state.db, order.id).await?;
    Ok(Json(OrderResponse::new(&order, &items)))
}
