use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::deals::dto::{CreateDealRequest, ImagePayload, UpdateDealRequest};
use crate::deals::repo::{Deal, DealImage, NewDeal};
use crate::deals::rules::{check_image_sizes, validate_transition, DealAttrs, DealFacts};
use crate::error::{ApiError, ValidationErrors};
use crate::jobs::Job;
use crate::orders;
use crate::orders::repo::{LineItem, Order, OrderState};
use crate::state::AppState;
use crate::storage::image_key;
use crate::{coupons, error};

struct UploadedImage {
    id: Uuid,
    s3_key: String,
    content_type: String,
    byte_size: i64,
}

fn decode_images(payloads: &[ImagePayload]) -> Result<Vec<(Bytes, String)>, ApiError> {
    let mut images = Vec::with_capacity(payloads.len());
    for payload in payloads {
        let bytes = BASE64.decode(&payload.data_b64).map_err(|_| {
            let mut errors = ValidationErrors::new();
            errors.add("images", "is not valid base64");
            ApiError::Validation(errors)
        })?;
        images.push((Bytes::from(bytes), payload.content_type.clone()));
    }
    Ok(images)
}

async fn upload_images(
    state: &AppState,
    deal_id: Uuid,
    images: Vec<(Bytes, String)>,
) -> Result<Vec<UploadedImage>, ApiError> {
    let mut uploaded = Vec::with_capacity(images.len());
    for (bytes, content_type) in images {
        let id = Uuid::new_v4();
        let s3_key = image_key(deal_id, id, &content_type);
        let byte_size = bytes.len() as i64;
        state.storage.put_object(&s3_key, bytes, &content_type).await?;
        uploaded.push(UploadedImage {
            id,
            s3_key,
            content_type,
            byte_size,
        });
    }
    Ok(uploaded)
}

/// Blobs uploaded for a save that did not commit are purged off-path.
fn purge_uploaded(state: &AppState, uploaded: &[UploadedImage]) {
    for image in uploaded {
        state.jobs.enqueue(Job::PurgeBlob {
            s3_key: image.s3_key.clone(),
        });
    }
}

pub async fn create_deal(state: &AppState, req: CreateDealRequest) -> Result<Deal, ApiError> {
    let now = OffsetDateTime::now_utc();
    let images = decode_images(&req.images)?;

    let attrs = DealAttrs {
        title: req.title.clone(),
        price: req.price,
        start_at: req.start_at,
        expire_at: req.expire_at,
        minimum_purchases_required: req.minimum_purchases_required,
        maximum_purchases_allowed: req.maximum_purchases_allowed,
        maximum_purchases_per_customer: req.maximum_purchases_per_customer,
        published_at: None,
        collection_id: req.collection_id,
        published_from_collection: false,
    };
    let facts = DealFacts {
        location_count: req.location_ids.len() as i64,
        image_count: images.len() as i64,
    };

    let mut errors = match validate_transition(None, &attrs, &facts, now) {
        Ok(()) => ValidationErrors::new(),
        Err(e) => e,
    };
    let sizes: Vec<i64> = images.iter().map(|(b, _)| b.len() as i64).collect();
    check_image_sizes(&mut errors, &sizes);
    if Deal::title_taken(&state.db, &req.title, None).await? {
        errors.add("title", "has already been taken");
    }
    errors.into_result()?;

    let deal_id = Uuid::new_v4();
    let uploaded = upload_images(state, deal_id, images).await?;

    match persist_create(state, deal_id, &req, &uploaded).await {
        Ok(deal) => {
            info!(deal_id = %deal.id, title = %deal.title, "deal created");
            Ok(deal)
        }
        Err(e) => {
            purge_uploaded(state, &uploaded);
            Err(e)
        }
    }
}

async fn persist_create(
    state: &AppState,
    deal_id: Uuid,
    req: &CreateDealRequest,
    uploaded: &[UploadedImage],
) -> Result<Deal, ApiError> {
    let new_deal = NewDeal {
        id: deal_id,
        title: req.title.clone(),
        description: req.description.clone(),
        instructions: req.instructions.clone(),
        start_at: req.start_at,
        expire_at: req.expire_at,
        price: req.price,
        minimum_purchases_required: req.minimum_purchases_required,
        maximum_purchases_allowed: req.maximum_purchases_allowed,
        maximum_purchases_per_customer: req.maximum_purchases_per_customer,
        category_id: req.category_id,
        collection_id: req.collection_id,
    };

    let mut tx = state.db.begin().await.map_err(anyhow::Error::from)?;
    let deal = Deal::insert_tx(&mut tx, &new_deal).await?;

    // Validation saw one clock, the database another. If start_at landed
    // behind the persisted created_at, undo the whole save.
    if deal.start_at < deal.created_at {
        tx.rollback().await.map_err(anyhow::Error::from)?;
        let mut errors = ValidationErrors::new();
        errors.add("start_at", "cannot be less than the current time");
        return Err(errors.into());
    }

    Deal::set_locations_tx(&mut tx, deal_id, &req.location_ids).await?;
    for image in uploaded {
        DealImage::insert_tx(
            &mut tx,
            image.id,
            deal_id,
            &image.s3_key,
            &image.content_type,
            image.byte_size,
        )
        .await?;
    }
    tx.commit().await.map_err(anyhow::Error::from)?;
    Ok(deal)
}

pub async fn update_deal(
    state: &AppState,
    id: Uuid,
    req: UpdateDealRequest,
) -> Result<Deal, ApiError> {
    let now = OffsetDateTime::now_utc();
    let old = Deal::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("deal"))?;
    let new_images = decode_images(&req.images)?;

    let existing_images = DealImage::list_by_deal(&state.db, id).await?;
    let removed: HashSet<Uuid> = req.remove_image_ids.iter().copied().collect();
    let remaining = existing_images
        .iter()
        .filter(|img| !removed.contains(&img.id))
        .count() as i64;
    let location_count = match &req.location_ids {
        Some(ids) => ids.len() as i64,
        None => Deal::location_count(&state.db, id).await?,
    };

    let title = req.title.clone().unwrap_or_else(|| old.title.clone());
    let attrs = DealAttrs {
        title: title.clone(),
        price: req.price.unwrap_or(old.price),
        start_at: req.start_at.unwrap_or(old.start_at),
        expire_at: req.expire_at.unwrap_or(old.expire_at),
        minimum_purchases_required: req
            .minimum_purchases_required
            .unwrap_or(old.minimum_purchases_required),
        maximum_purchases_allowed: req
            .maximum_purchases_allowed
            .or(old.maximum_purchases_allowed),
        maximum_purchases_per_customer: req
            .maximum_purchases_per_customer
            .or(old.maximum_purchases_per_customer),
        published_at: old.published_at,
        collection_id: req.collection_id.or(old.collection_id),
        published_from_collection: false,
    };
    let facts = DealFacts {
        location_count,
        image_count: remaining + new_images.len() as i64,
    };

    let mut errors = match validate_transition(Some(&old), &attrs, &facts, now) {
        Ok(()) => ValidationErrors::new(),
        Err(e) => e,
    };
    let sizes: Vec<i64> = new_images.iter().map(|(b, _)| b.len() as i64).collect();
    check_image_sizes(&mut errors, &sizes);
    if Deal::title_taken(&state.db, &title, Some(id)).await? {
        errors.add("title", "has already been taken");
    }
    errors.into_result()?;

    let uploaded = upload_images(state, id, new_images).await?;

    match persist_update(state, &old, &attrs, &req, &uploaded).await {
        Ok((deal, purged_keys)) => {
            // Removed attachments are purged from storage off-path, only
            // once the delete has committed.
            for s3_key in purged_keys {
                state.jobs.enqueue(Job::PurgeBlob { s3_key });
            }
            info!(deal_id = %deal.id, "deal updated");
            Ok(deal)
        }
        Err(e) => {
            purge_uploaded(state, &uploaded);
            Err(e)
        }
    }
}

async fn persist_update(
    state: &AppState,
    old: &Deal,
    attrs: &DealAttrs,
    req: &UpdateDealRequest,
    uploaded: &[UploadedImage],
) -> Result<(Deal, Vec<String>), ApiError> {
    let next = Deal {
        title: attrs.title.clone(),
        description: req.description.clone().or_else(|| old.description.clone()),
        instructions: req
            .instructions
            .clone()
            .or_else(|| old.instructions.clone()),
        start_at: attrs.start_at,
        expire_at: attrs.expire_at,
        price: attrs.price,
        minimum_purchases_required: attrs.minimum_purchases_required,
        maximum_purchases_allowed: attrs.maximum_purchases_allowed,
        maximum_purchases_per_customer: attrs.maximum_purchases_per_customer,
        category_id: req.category_id.unwrap_or(old.category_id),
        collection_id: attrs.collection_id,
        ..old.clone()
    };

    let mut tx = state.db.begin().await.map_err(anyhow::Error::from)?;
    let deal = Deal::update_tx(&mut tx, &next).await?;
    if let Some(location_ids) = &req.location_ids {
        Deal::set_locations_tx(&mut tx, deal.id, location_ids).await?;
    }
    let purged_keys = if req.remove_image_ids.is_empty() {
        Vec::new()
    } else {
        DealImage::delete_tx(&mut tx, deal.id, &req.remove_image_ids).await?
    };
    for image in uploaded {
        DealImage::insert_tx(
            &mut tx,
            image.id,
            deal.id,
            &image.s3_key,
            &image.content_type,
            image.byte_size,
        )
        .await?;
    }
    tx.commit().await.map_err(anyhow::Error::from)?;
    Ok((deal, purged_keys))
}

/// Publish through the transition validator; returns the new timestamp.
pub async fn publish_deal(
    state: &AppState,
    id: Uuid,
    from_collection: bool,
) -> Result<Option<OffsetDateTime>, ApiError> {
    let now = OffsetDateTime::now_utc();
    let old = Deal::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("deal"))?;

    let mut attrs = DealAttrs::from(&old);
    attrs.published_at = Some(now);
    attrs.published_from_collection = from_collection;
    let facts = DealFacts {
        location_count: Deal::location_count(&state.db, id).await?,
        image_count: Deal::image_count(&state.db, id).await?,
    };
    validate_transition(Some(&old), &attrs, &facts, now)?;

    let published = Deal::set_published_at(&state.db, id, Some(now)).await?;
    info!(deal_id = %id, "deal published");
    Ok(published)
}

/// Unpublish is a direct timestamp reset; there is nothing to validate.
pub async fn unpublish_deal(
    state: &AppState,
    id: Uuid,
) -> Result<Option<OffsetDateTime>, ApiError> {
    Deal::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("deal"))?;
    let published = Deal::set_published_at(&state.db, id, None).await?;
    info!(deal_id = %id, "deal unpublished");
    Ok(published)
}

pub async fn destroy_deal(state: &AppState, id: Uuid) -> Result<(), ApiError> {
    let images = DealImage::list_by_deal(&state.db, id).await?;
    let deleted = Deal::delete(&state.db, id).await.map_err(|e| {
        match e.downcast_ref::<sqlx::Error>() {
            Some(db_err) if error::is_foreign_key_violation(db_err) => {
                ApiError::Conflict("deal has purchases and cannot be deleted".into())
            }
            _ => ApiError::Internal(e),
        }
    })?;
    if !deleted {
        return Err(ApiError::NotFound("deal"));
    }
    for image in images {
        state.jobs.enqueue(Job::PurgeBlob {
            s3_key: image.s3_key,
        });
    }
    info!(deal_id = %id, "deal destroyed");
    Ok(())
}

/// Close out deals that expired within the trailing day: deals that met
/// their minimum get coupons minted and orders delivered, the rest get
/// their orders cancelled. Runs as the system actor from the sweeper.
pub async fn finalize_expired(state: &AppState) -> Result<(), ApiError> {
    let now = OffsetDateTime::now_utc();
    let deals = Deal::expired_recently(&state.db, now).await?;
    for deal in deals {
        let sold = Deal::quantity_sold(&state.db, deal.id).await?;
        if deal.minimum_criteria_met(sold) {
            fulfill_deal(state, &deal).await?;
        } else {
            cancel_deal_orders(state, &deal).await?;
        }
    }
    Ok(())
}

async fn fulfill_deal(state: &AppState, deal: &Deal) -> Result<(), ApiError> {
    let line_items =
        LineItem::for_deal_in_state(&state.db, deal.id, OrderState::Paid).await?;
    let mut order_ids = HashSet::new();
    for line_item in &line_items {
        coupons::services::generate_for_line_item(state, line_item).await?;
        order_ids.insert(line_item.order_id);
    }
    for order_id in order_ids {
        if let Err(e) = orders::services::deliver_order(&state.db, order_id).await {
            warn!(%order_id, error = %e, "deliver failed during finalization");
        }
    }
    info!(deal_id = %deal.id, line_items = line_items.len(), "deal fulfilled");
    Ok(())
}

async fn cancel_deal_orders(state: &AppState, deal: &Deal) -> Result<(), ApiError> {
    let orders_to_cancel = Order::for_deal(&state.db, deal.id).await?;
    for order in orders_to_cancel {
        if !order.state.can_transition_to(OrderState::Cancelled) {
            continue;
        }
        if let Err(e) = orders::services::cancel_order(&state.db, order.id).await {
            warn!(order_id = %order.id, error = %e, "cancel failed during finalization");
        }
    }
    info!(deal_id = %deal.id, "deal orders cancelled");
    Ok(())
}
