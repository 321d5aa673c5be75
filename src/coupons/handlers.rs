use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::auth::jwt::AuthUser;
use crate::coupons::repo::Coupon;
use crate::coupons::services;
use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/coupons/:code/redeem", post(redeem))
}

#[instrument(skip(state))]
async fn redeem(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(code): Path<String>,
) -> Result<Json<Coupon>, ApiError> {
    let coupon = services::redeem_coupon(&state, &code, user_id).await?;
    Ok(Json(coupon))
}
