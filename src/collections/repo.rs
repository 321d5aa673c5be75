use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Collection {
    pub id: Uuid,
    pub name: String,
    pub created_at: OffsetDateTime,
}

impl Collection {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Collection>> {
        let collection = sqlx::query_as::<_, Collection>(
            "SELECT id, name, created_at FROM collections WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(collection)
    }

    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Collection>> {
        let collections = sqlx::query_as::<_, Collection>(
            "SELECT id, name, created_at FROM collections ORDER BY name ASC",
        )
        .fetch_all(db)
        .await?;
        Ok(collections)
    }

    pub async fn create(db: &PgPool, name: &str) -> anyhow::Result<Collection> {
        let collection = sqlx::query_as::<_, Collection>(
            "INSERT INTO collections (name) VALUES ($1) RETURNING id, name, created_at",
        )
        .bind(name)
        .fetch_one(db)
        .await?;
        Ok(collection)
    }
}
