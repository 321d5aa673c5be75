use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Location {
    pub id: Uuid,
    pub city: String,
    pub created_at: OffsetDateTime,
}

impl Location {
    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Location>> {
        let locations = sqlx::query_as::<_, Location>(
            "SELECT id, city, created_at FROM locations ORDER BY city ASC",
        )
        .fetch_all(db)
        .await?;
        Ok(locations)
    }

    pub async fn create(db: &PgPool, city: &str) -> anyhow::Result<Location> {
        let location = sqlx::query_as::<_, Location>(
            "INSERT INTO locations (city) VALUES ($1) RETURNING id, city, created_at",
        )
        .bind(city)
        .fetch_one(db)
        .await?;
        Ok(location)
    }
}
