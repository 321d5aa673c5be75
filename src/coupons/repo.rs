use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Coupon {
    pub id: Uuid,
    pub line_item_id: Uuid,
    pub code: String,
    pub redeemed_by: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

const COUPON_COLUMNS: &str = "id, line_item_id, code, redeemed_by, created_at";

impl Coupon {
    pub async fn find_by_code(db: &PgPool, code: &str) -> anyhow::Result<Option<Coupon>> {
        let coupon = sqlx::query_as::<_, Coupon>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(db)
        .await?;
        Ok(coupon)
    }

    /// Raw insert; unique-violation handling is the caller's concern.
    pub async fn insert(
        db: &PgPool,
        line_item_id: Uuid,
        code: &str,
    ) -> Result<Coupon, sqlx::Error> {
        sqlx::query_as::<_, Coupon>(&format!(
            "INSERT INTO coupons (line_item_id, code)
             VALUES ($1, $2)
             RETURNING {COUPON_COLUMNS}"
        ))
        .bind(line_item_id)
        .bind(code)
        .fetch_one(db)
        .await
    }

    /// First redemption wins; an already-redeemed code returns None.
    pub async fn redeem(
        db: &PgPool,
        code: &str,
        user_id: Uuid,
    ) -> anyhow::Result<Option<Coupon>> {
        let coupon = sqlx::query_as::<_, Coupon>(&format!(
            "UPDATE coupons SET redeemed_by = $2
             WHERE code = $1 AND redeemed_by IS NULL
             RETURNING {COUPON_COLUMNS}"
        ))
        .bind(code)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(coupon)
    }

}

/// The purchaser's email and the code, for the coupon-issued notification.
pub async fn coupon_recipient(
    db: &PgPool,
    coupon_id: Uuid,
) -> anyhow::Result<Option<(String, String)>> {
    let row = sqlx::query_as::<_, (String, String)>(
        "SELECT u.email, c.code
         FROM coupons c
         JOIN line_items li ON li.id = c.line_item_id
         JOIN orders o ON o.id = li.order_id
         JOIN users u ON u.id = o.user_id
         WHERE c.id = $1",
    )
    .bind(coupon_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}
