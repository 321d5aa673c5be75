use tracing::info;
use uuid::Uuid;

use crate::coupons::repo::Coupon;
use crate::error::{is_unique_violation, ApiError};
use crate::jobs::Job;
use crate::orders::repo::LineItem;
use crate::state::AppState;
use crate::token::{urlsafe_token, MAX_TOKEN_ATTEMPTS};

/// Mint one coupon: generate a code, check it is unused, insert. A lookup
/// miss can still lose the insert race, so a unique violation counts as one
/// more collision; the unique index is the final arbiter.
pub async fn create_coupon(state: &AppState, line_item_id: Uuid) -> Result<Coupon, ApiError> {
    for _ in 0..MAX_TOKEN_ATTEMPTS {
        let code = urlsafe_token();
        if Coupon::find_by_code(&state.db, &code).await?.is_some() {
            continue;
        }
        match Coupon::insert(&state.db, line_item_id, &code).await {
            Ok(coupon) => {
                state.jobs.enqueue(Job::SendCouponEmail {
                    coupon_id: coupon.id,
                });
                return Ok(coupon);
            }
            Err(e) if is_unique_violation(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::Conflict("could not allocate a coupon code".into()))
}

/// One coupon per purchased unit.
pub async fn generate_for_line_item(
    state: &AppState,
    line_item: &LineItem,
) -> Result<Vec<Coupon>, ApiError> {
    let mut coupons = Vec::with_capacity(line_item.quantity as usize);
    for _ in 0..line_item.quantity {
        coupons.push(create_coupon(state, line_item.id).await?);
    }
    info!(line_item_id = %line_item.id, count = coupons.len(), "coupons issued");
    Ok(coupons)
}

pub async fn redeem_coupon(
    state: &AppState,
    code: &str,
    user_id: Uuid,
) -> Result<Coupon, ApiError> {
    match Coupon::redeem(&state.db, code, user_id).await? {
        Some(coupon) => {
            info!(coupon_id = %coupon.id, %user_id, "coupon redeemed");
            Ok(coupon)
        }
        None => {
            if Coupon::find_by_code(&state.db, code).await?.is_some() {
                Err(ApiError::Conflict("coupon has already been redeemed".into()))
            } else {
                Err(ApiError::NotFound("coupon"))
            }
        }
    }
}
