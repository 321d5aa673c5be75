use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::deals::repo::Deal;
use crate::deals::rules::DealStatus;

/// One image attachment, base64-encoded.
#[derive(Debug, Deserialize)]
pub struct ImagePayload {
    pub data_b64: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    "image/jpeg".into()
}

#[derive(Debug, Deserialize)]
pub struct CreateDealRequest {
    pub title: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
    pub price: Decimal,
    #[serde(default)]
    pub minimum_purchases_required: i32,
    pub maximum_purchases_allowed: Option<i32>,
    pub maximum_purchases_per_customer: Option<i32>,
    pub category_id: Uuid,
    pub collection_id: Option<Uuid>,
    #[serde(default)]
    pub location_ids: Vec<Uuid>,
    #[serde(default)]
    pub images: Vec<ImagePayload>,
}

/// Patch-style update; absent fields keep their current values.
#[derive(Debug, Deserialize)]
pub struct UpdateDealRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expire_at: Option<OffsetDateTime>,
    pub price: Option<Decimal>,
    pub minimum_purchases_required: Option<i32>,
    pub maximum_purchases_allowed: Option<i32>,
    pub maximum_purchases_per_customer: Option<i32>,
    pub category_id: Option<Uuid>,
    pub collection_id: Option<Uuid>,
    pub location_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub images: Vec<ImagePayload>,
    #[serde(default)]
    pub remove_image_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct DealFilter {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct DealSummary {
    pub id: Uuid,
    pub title: String,
    pub price: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    pub start_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
    pub status: DealStatus,
    pub category_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct DealDetails {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub price: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    pub start_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
    pub minimum_purchases_required: i32,
    pub maximum_purchases_allowed: Option<i32>,
    pub maximum_purchases_per_customer: Option<i32>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    pub status: DealStatus,
    pub category_id: Uuid,
    pub collection_id: Option<Uuid>,
    pub quantity_sold: i64,
    pub quantity_left: i64,
    pub percentage_sold: i64,
    pub images: Vec<String>,
}

impl DealSummary {
    pub fn from_deal(deal: &Deal, now: OffsetDateTime) -> Self {
        Self {
            id: deal.id,
            title: deal.title.clone(),
            price: deal.price,
            start_at: deal.start_at,
            expire_at: deal.expire_at,
            status: deal.status(now),
            category_id: deal.category_id,
        }
    }
}
