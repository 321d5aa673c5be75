use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::jwt::AdminUser;
use crate::collections::repo::Collection;
use crate::deals::dto::DealSummary;
use crate::deals::repo::Deal;
use crate::deals::services::publish_deal;
use crate::error::{ApiError, ValidationErrors};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CollectionPublishResult {
    pub published: Vec<Uuid>,
    pub failed: Vec<FailedPublish>,
}

#[derive(Debug, Serialize)]
pub struct FailedPublish {
    pub deal_id: Uuid,
    pub errors: ValidationErrors,
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/collections", get(list_collections).post(create_collection))
        .route("/collections/:id/deals", get(available_deals))
        .route("/collections/:id/publish", post(publish_collection))
}

#[instrument(skip(state, _admin))]
async fn list_collections(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<Collection>>, ApiError> {
    Ok(Json(Collection::list(&state.db).await?))
}

#[instrument(skip(state, _admin))]
async fn create_collection(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<CreateCollectionRequest>,
) -> Result<(StatusCode, Json<Collection>), ApiError> {
    if payload.name.trim().is_empty() {
        let mut errors = ValidationErrors::new();
        errors.add("name", "can't be blank");
        return Err(errors.into());
    }
    let collection = Collection::create(&state.db, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(collection)))
}

/// Deals this collection could adopt: unpublished strays plus its own.
#[instrument(skip(state, _admin))]
async fn available_deals(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DealSummary>>, ApiError> {
    Collection::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("collection"))?;
    let now = OffsetDateTime::now_utc();
    let deals = Deal::available_for_collection(&state.db, id).await?;
    Ok(Json(
        deals
            .iter()
            .map(|d| DealSummary::from_deal(d, now))
            .collect(),
    ))
}

/// Publish every member deal with the collection flag set; failures are
/// reported per deal rather than aborting the batch.
#[instrument(skip(state, _admin))]
async fn publish_collection(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CollectionPublishResult>, ApiError> {
    Collection::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("collection"))?;

    let mut result = CollectionPublishResult {
        published: Vec::new(),
        failed: Vec::new(),
    };
    for deal in Deal::in_collection(&state.db, id).await? {
        match publish_deal(&state, deal.id, true).await {
            Ok(_) => result.published.push(deal.id),
            Err(ApiError::Validation(errors)) => result.failed.push(FailedPublish {
                deal_id: deal.id,
                errors,
            }),
            Err(e) => return Err(e),
        }
    }
    Ok(Json(result))
}
