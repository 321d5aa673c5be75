use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Deserialize;
use tracing::instrument;

use crate::auth::jwt::AdminUser;
use crate::error::{ApiError, ValidationErrors};
use crate::locations::repo::Location;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateLocationRequest {
    pub city: String,
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/locations", get(list_locations).post(create_location))
}

#[instrument(skip(state, _admin))]
async fn list_locations(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<Location>>, ApiError> {
    Ok(Json(Location::list(&state.db).await?))
}

#[instrument(skip(state, _admin))]
async fn create_location(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<CreateLocationRequest>,
) -> Result<(StatusCode, Json<Location>), ApiError> {
    if payload.city.trim().is_empty() {
        let mut errors = ValidationErrors::new();
        errors.add("city", "can't be blank");
        return Err(errors.into());
    }
    let location = Location::create(&state.db, &payload.city).await?;
    Ok((StatusCode::CREATED, Json(location)))
}
