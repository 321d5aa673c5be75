use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Deal {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub start_at: OffsetDateTime,
    pub expire_at: OffsetDateTime,
    pub price: Decimal,
    pub minimum_purchases_required: i32,
    pub maximum_purchases_allowed: Option<i32>,
    pub maximum_purchases_per_customer: Option<i32>,
    pub published_at: Option<OffsetDateTime>,
    pub category_id: Uuid,
    pub collection_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DealImage {
    pub id: Uuid,
    pub deal_id: Uuid,
    pub s3_key: String,
    pub content_type: String,
    pub byte_size: i64,
    pub created_at: OffsetDateTime,
}

pub struct NewDeal {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub start_at: OffsetDateTime,
    pub expire_at: OffsetDateTime,
    pub price: Decimal,
    pub minimum_purchases_required: i32,
    pub maximum_purchases_allowed: Option<i32>,
    pub maximum_purchases_per_customer: Option<i32>,
    pub category_id: Uuid,
    pub collection_id: Option<Uuid>,
}

const DEAL_COLUMNS: &str = "id, title, description, instructions, start_at, expire_at, price, \
     minimum_purchases_required, maximum_purchases_allowed, maximum_purchases_per_customer, \
     published_at, category_id, collection_id, created_at, updated_at";

impl Deal {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Deal>> {
        let deal = sqlx::query_as::<_, Deal>(&format!(
            "SELECT {DEAL_COLUMNS} FROM deals WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(deal)
    }

    pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<Deal>> {
        let deals = sqlx::query_as::<_, Deal>(&format!(
            "SELECT {DEAL_COLUMNS} FROM deals ORDER BY created_at DESC"
        ))
        .fetch_all(db)
        .await?;
        Ok(deals)
    }

    pub async fn title_taken(
        db: &PgPool,
        title: &str,
        exclude: Option<Uuid>,
    ) -> anyhow::Result<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                 SELECT 1 FROM deals
                 WHERE lower(title) = lower($1) AND ($2::uuid IS NULL OR id <> $2)
             )",
        )
        .bind(title)
        .bind(exclude)
        .fetch_one(db)
        .await?;
        Ok(taken)
    }

    pub async fn insert_tx(
        tx: &mut Transaction<'_, Postgres>,
        new_deal: &NewDeal,
    ) -> anyhow::Result<Deal> {
        let deal = sqlx::query_as::<_, Deal>(&format!(
            "INSERT INTO deals (id, title, description, instructions, start_at, expire_at, price,
                 minimum_purchases_required, maximum_purchases_allowed,
                 maximum_purchases_per_customer, category_id, collection_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {DEAL_COLUMNS}"
        ))
        .bind(new_deal.id)
        .bind(&new_deal.title)
        .bind(&new_deal.description)
        .bind(&new_deal.instructions)
        .bind(new_deal.start_at)
        .bind(new_deal.expire_at)
        .bind(new_deal.price)
        .bind(new_deal.minimum_purchases_required)
        .bind(new_deal.maximum_purchases_allowed)
        .bind(new_deal.maximum_purchases_per_customer)
        .bind(new_deal.category_id)
        .bind(new_deal.collection_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(deal)
    }

    /// Persist every mutable column from `deal`.
    pub async fn update_tx(
        tx: &mut Transaction<'_, Postgres>,
        deal: &Deal,
    ) -> anyhow::Result<Deal> {
        let deal = sqlx::query_as::<_, Deal>(&format!(
            "UPDATE deals
             SET title = $2, description = $3, instructions = $4, start_at = $5,
                 expire_at = $6, price = $7, minimum_purchases_required = $8,
                 maximum_purchases_allowed = $9, maximum_purchases_per_customer = $10,
                 category_id = $11, collection_id = $12, updated_at = now()
             WHERE id = $1
             RETURNING {DEAL_COLUMNS}"
        ))
        .bind(deal.id)
        .bind(&deal.title)
        .bind(&deal.description)
        .bind(&deal.instructions)
        .bind(deal.start_at)
        .bind(deal.expire_at)
        .bind(deal.price)
        .bind(deal.minimum_purchases_required)
        .bind(deal.maximum_purchases_allowed)
        .bind(deal.maximum_purchases_per_customer)
        .bind(deal.category_id)
        .bind(deal.collection_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(deal)
    }

    pub async fn set_published_at(
        db: &PgPool,
        id: Uuid,
        published_at: Option<OffsetDateTime>,
    ) -> anyhow::Result<Option<OffsetDateTime>> {
        let published = sqlx::query_scalar::<_, Option<OffsetDateTime>>(
            "UPDATE deals SET published_at = $2, updated_at = now()
             WHERE id = $1
             RETURNING published_at",
        )
        .bind(id)
        .bind(published_at)
        .fetch_one(db)
        .await?;
        Ok(published)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM deals WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Published, not yet expired, optionally narrowed by category and a
    /// title-or-city prefix search.
    pub async fn list_published_live(
        db: &PgPool,
        now: OffsetDateTime,
        search: Option<&str>,
        category_id: Option<Uuid>,
    ) -> anyhow::Result<Vec<Deal>> {
        let deals = sqlx::query_as::<_, Deal>(&format!(
            "SELECT {DEAL_COLUMNS} FROM deals d
             WHERE d.published_at IS NOT NULL
               AND d.expire_at > $1
               AND ($2::uuid IS NULL OR d.category_id = $2)
               AND ($3::text IS NULL
                    OR d.title ILIKE $3 || '%'
                    OR EXISTS (
                        SELECT 1 FROM deals_locations dl
                        JOIN locations l ON l.id = dl.location_id
                        WHERE dl.deal_id = d.id AND l.city ILIKE $3 || '%'
                    ))
             ORDER BY d.published_at DESC"
        ))
        .bind(now)
        .bind(category_id)
        .bind(search)
        .fetch_all(db)
        .await?;
        Ok(deals)
    }

    /// Deals a collection may adopt: unpublished strays plus its own.
    pub async fn available_for_collection(
        db: &PgPool,
        collection_id: Uuid,
    ) -> anyhow::Result<Vec<Deal>> {
        let deals = sqlx::query_as::<_, Deal>(&format!(
            "SELECT {DEAL_COLUMNS} FROM deals
             WHERE (collection_id IS NULL AND published_at IS NULL) OR collection_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(collection_id)
        .fetch_all(db)
        .await?;
        Ok(deals)
    }

    pub async fn in_collection(db: &PgPool, collection_id: Uuid) -> anyhow::Result<Vec<Deal>> {
        let deals = sqlx::query_as::<_, Deal>(&format!(
            "SELECT {DEAL_COLUMNS} FROM deals WHERE collection_id = $1 ORDER BY created_at DESC"
        ))
        .bind(collection_id)
        .fetch_all(db)
        .await?;
        Ok(deals)
    }

    /// Deals whose expiry fell inside the trailing day; the finalization
    /// sweep works off this window.
    pub async fn expired_recently(
        db: &PgPool,
        now: OffsetDateTime,
    ) -> anyhow::Result<Vec<Deal>> {
        let deals = sqlx::query_as::<_, Deal>(&format!(
            "SELECT {DEAL_COLUMNS} FROM deals
             WHERE expire_at > $1 - INTERVAL '1 day' AND expire_at <= $1"
        ))
        .bind(now)
        .fetch_all(db)
        .await?;
        Ok(deals)
    }

    /// Units sold across completed orders.
    pub async fn quantity_sold(db: &PgPool, deal_id: Uuid) -> anyhow::Result<i64> {
        let sold = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(li.quantity), 0)::bigint
             FROM line_items li
             JOIN orders o ON o.id = li.order_id
             WHERE li.deal_id = $1 AND o.state IN ('paid', 'delivered')",
        )
        .bind(deal_id)
        .fetch_one(db)
        .await?;
        Ok(sold)
    }

    pub async fn location_count(db: &PgPool, deal_id: Uuid) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM deals_locations WHERE deal_id = $1",
        )
        .bind(deal_id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    pub async fn image_count(db: &PgPool, deal_id: Uuid) -> anyhow::Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM deal_images WHERE deal_id = $1")
                .bind(deal_id)
                .fetch_one(db)
                .await?;
        Ok(count)
    }

    pub async fn set_locations_tx(
        tx: &mut Transaction<'_, Postgres>,
        deal_id: Uuid,
        location_ids: &[Uuid],
    ) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM deals_locations WHERE deal_id = $1")
            .bind(deal_id)
            .execute(&mut **tx)
            .await?;
        for location_id in location_ids {
            sqlx::query(
                "INSERT INTO deals_locations (deal_id, location_id) VALUES ($1, $2)
                 ON CONFLICT DO NOTHING",
            )
            .bind(deal_id)
            .bind(location_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

impl DealImage {
    pub async fn insert_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        deal_id: Uuid,
        s3_key: &str,
        content_type: &str,
        byte_size: i64,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO deal_images (id, deal_id, s3_key, content_type, byte_size)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(deal_id)
        .bind(s3_key)
        .bind(content_type)
        .bind(byte_size)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn list_by_deal(db: &PgPool, deal_id: Uuid) -> anyhow::Result<Vec<DealImage>> {
        let images = sqlx::query_as::<_, DealImage>(
            "SELECT id, deal_id, s3_key, content_type, byte_size, created_at
             FROM deal_images
             WHERE deal_id = $1
             ORDER BY created_at ASC",
        )
        .bind(deal_id)
        .fetch_all(db)
        .await?;
        Ok(images)
    }

    /// Remove rows and hand back the blob keys for deferred purging.
    pub async fn delete_tx(
        tx: &mut Transaction<'_, Postgres>,
        deal_id: Uuid,
        image_ids: &[Uuid],
    ) -> anyhow::Result<Vec<String>> {
        let keys = sqlx::query_scalar::<_, String>(
            "DELETE FROM deal_images WHERE deal_id = $1 AND id = ANY($2)
             RETURNING s3_key",
        )
        .bind(deal_id)
        .bind(image_ids)
        .fetch_all(&mut **tx)
        .await?;
        Ok(keys)
    }
}
