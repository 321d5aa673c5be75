use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::jwt::AdminUser;
use crate::deals::dto::{
    CreateDealRequest, DealDetails, DealFilter, DealSummary, UpdateDealRequest,
};
use crate::deals::repo::{Deal, DealImage};
use crate::deals::services;
use crate::error::ApiError;
use crate::state::AppState;

const IMAGE_URL_TTL_SECS: u64 = 30 * 60;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/deals", get(list_deals).post(create_deal))
        .route(
            "/deals/:id",
            get(show_deal).put(update_deal).delete(destroy_deal),
        )
        .route("/deals/:id/publish", post(publish_deal))
        .route("/deals/:id/unpublish", post(unpublish_deal))
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/deals", get(list_live_deals))
        .route("/deals/:id", get(show_live_deal))
}

async fn deal_details(state: &AppState, deal: Deal) -> Result<DealDetails, ApiError> {
    let now = OffsetDateTime::now_utc();
    let sold = Deal::quantity_sold(&state.db, deal.id).await?;
    let mut images = Vec::new();
    for image in DealImage::list_by_deal(&state.db, deal.id).await? {
        images.push(
            state
                .storage
                .presign_get(&image.s3_key, IMAGE_URL_TTL_SECS)
                .await?,
        );
    }
    Ok(DealDetails {
        id: deal.id,
        title: deal.title.clone(),
        description: deal.description.clone(),
        instructions: deal.instructions.clone(),
        price: deal.price,
        start_at: deal.start_at,
        expire_at: deal.expire_at,
        minimum_purchases_required: deal.minimum_purchases_required,
        maximum_purchases_allowed: deal.maximum_purchases_allowed,
        maximum_purchases_per_customer: deal.maximum_purchases_per_customer,
        published_at: deal.published_at,
        status: deal.status(now),
        category_id: deal.category_id,
        collection_id: deal.collection_id,
        quantity_sold: sold,
        quantity_left: deal.quantity_left(sold),
        percentage_sold: deal.percentage_sold(sold),
        images,
    })
}

// --- admin ---

#[instrument(skip(state, _admin))]
async fn list_deals(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<DealSummary>>, ApiError> {
    let now = OffsetDateTime::now_utc();
    let deals = Deal::list_all(&state.db).await?;
    Ok(Json(
        deals
            .iter()
            .map(|d| DealSummary::from_deal(d, now))
            .collect(),
    ))
}

#[instrument(skip(state, _admin, payload))]
async fn create_deal(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<CreateDealRequest>,
) -> Result<(StatusCode, Json<DealDetails>), ApiError> {
    let deal = services::create_deal(&state, payload).await?;
    let details = deal_details(&state, deal).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

#[instrument(skip(state, _admin))]
async fn show_deal(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DealDetails>, ApiError> {
    let deal = Deal::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("deal"))?;
    Ok(Json(deal_details(&state, deal).await?))
}

#[instrument(skip(state, _admin, payload))]
async fn update_deal(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDealRequest>,
) -> Result<Json<DealDetails>, ApiError> {
    let deal = services::update_deal(&state, id, payload).await?;
    Ok(Json(deal_details(&state, deal).await?))
}

#[instrument(skip(state, _admin))]
async fn destroy_deal(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    services::destroy_deal(&state, id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Returns the resulting publish timestamp as a raw JSON value.
#[instrument(skip(state, _admin))]
async fn publish_deal(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Option<OffsetDateTime>>, ApiError> {
    let published_at = services::publish_deal(&state, id, false).await?;
    Ok(Json(published_at))
}

#[instrument(skip(state, _admin))]
async fn unpublish_deal(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Option<OffsetDateTime>>, ApiError> {
    let published_at = services::unpublish_deal(&state, id).await?;
    Ok(Json(published_at))
}

// --- customer facing ---

#[instrument(skip(state))]
async fn list_live_deals(
    State(state): State<AppState>,
    Query(filter): Query<DealFilter>,
) -> Result<Json<Vec<DealSummary>>, ApiError> {
    let now = OffsetDateTime::now_utc();
    let deals = Deal::list_published_live(
        &state.db,
        now,
        filter.search.as_deref(),
        filter.category_id,
    )
    .await?;
    Ok(Json(
        deals
            .iter()
            .map(|d| DealSummary::from_deal(d, now))
            .collect(),
    ))
}

/// Drafts are invisible to customers; published deals stay viewable after
/// expiry.
#[instrument(skip(state))]
async fn show_live_deal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DealDetails>, ApiError> {
    let deal = Deal::find_by_id(&state.db, id)
        .await?
        .filter(|d| d.published_at.is_some())
        .ok_or(ApiError::NotFound("deal"))?;
    Ok(Json(deal_details(&state, deal).await?))
}
