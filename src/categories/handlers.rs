use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Deserialize;
use tracing::instrument;

use crate::auth::jwt::AdminUser;
use crate::categories::repo::Category;
use crate::error::{is_unique_violation, ApiError, ValidationErrors};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
}

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/categories", get(list_categories))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/categories", get(list_categories).post(create_category))
}

#[instrument(skip(state))]
async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(Category::list(&state.db).await?))
}

#[instrument(skip(state, _admin))]
async fn create_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    if payload.name.trim().is_empty() {
        let mut errors = ValidationErrors::new();
        errors.add("name", "can't be blank");
        return Err(errors.into());
    }
    let category = Category::create(&state.db, &payload.name)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                let mut errors = ValidationErrors::new();
                errors.add("name", "has already been taken");
                ApiError::Validation(errors)
            } else {
                ApiError::Internal(e.into())
            }
        })?;
    Ok((StatusCode::CREATED, Json(category)))
}
