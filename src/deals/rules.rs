use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::deals::repo::Deal;
use crate::error::ValidationErrors;

pub const MIN_ALLOWED_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
pub const MAX_ALLOWED_PRICE: Decimal = Decimal::from_parts(999_999, 0, 0, false, 2);

/// Per-image byte ceiling; anything larger is rejected and never uploaded.
pub const MAXIMUM_ALLOWED_IMAGE_SIZE: i64 = 100_000;
pub const MINIMUM_IMAGE_COUNT: i64 = 1;
pub const MINIMUM_LOCATION_COUNT: i64 = 1;

/// A deal's lifecycle position at a given instant. Expired wins over
/// published, so a published deal past `expire_at` reads as `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DealStatus {
    Draft,
    Published,
    Expired,
}

/// The attribute set a save is trying to persist.
#[derive(Debug, Clone)]
pub struct DealAttrs {
    pub title: String,
    pub price: Decimal,
    pub start_at: OffsetDateTime,
    pub expire_at: OffsetDateTime,
    pub minimum_purchases_required: i32,
    pub maximum_purchases_allowed: Option<i32>,
    pub maximum_purchases_per_customer: Option<i32>,
    pub published_at: Option<OffsetDateTime>,
    pub collection_id: Option<Uuid>,
    /// Set only when the save is driven by a collection publish; suppresses
    /// the collection-presence error and nothing else.
    pub published_from_collection: bool,
}

impl From<&Deal> for DealAttrs {
    fn from(deal: &Deal) -> Self {
        Self {
            title: deal.title.clone(),
            price: deal.price,
            start_at: deal.start_at,
            expire_at: deal.expire_at,
            minimum_purchases_required: deal.minimum_purchases_required,
            maximum_purchases_allowed: deal.maximum_purchases_allowed,
            maximum_purchases_per_customer: deal.maximum_purchases_per_customer,
            published_at: deal.published_at,
            collection_id: deal.collection_id,
            published_from_collection: false,
        }
    }
}

/// Location/image counts the transition is validated against.
#[derive(Debug, Clone, Copy)]
pub struct DealFacts {
    pub location_count: i64,
    pub image_count: i64,
}

/// Validates one mutation of a deal. `old` is `None` on create. All
/// violations are collected before returning; the caller persists nothing
/// unless this returns Ok.
///
/// The publish gate and the live-or-expired gate are mutually exclusive,
/// keyed on whether `published_at` changes in this save.
pub fn validate_transition(
    old: Option<&Deal>,
    next: &DealAttrs,
    facts: &DealFacts,
    now: OffsetDateTime,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if next.title.trim().is_empty() {
        errors.add("title", "can't be blank");
    }

    if next.price < MIN_ALLOWED_PRICE {
        errors.add("price", "must be greater than or equal to 0.01");
    }
    if next.price > MAX_ALLOWED_PRICE {
        errors.add("price", "must be less than or equal to 9999.99");
    }

    if next.minimum_purchases_required < 0 {
        errors.add(
            "minimum_purchases_required",
            "must be greater than or equal to 0",
        );
    }
    if let Some(max) = next.maximum_purchases_allowed {
        if max <= next.minimum_purchases_required {
            errors.add(
                "maximum_purchases_allowed",
                "must be greater than minimum_purchases_required",
            );
        }
    }
    if let Some(per_customer) = next.maximum_purchases_per_customer {
        if per_customer < 0 {
            errors.add(
                "maximum_purchases_per_customer",
                "must be greater than or equal to 0",
            );
        }
        if let Some(max) = next.maximum_purchases_allowed {
            if per_customer > max {
                errors.add(
                    "maximum_purchases_per_customer",
                    "must be less than or equal to maximum_purchases_allowed",
                );
            }
        }
    }

    if next.expire_at <= next.start_at {
        errors.add("expire_at", "must be after start_at");
    }

    match old {
        None => {
            if next.start_at <= now {
                errors.add("start_at", "must be in the future");
            }
        }
        Some(old) => {
            if next.start_at <= old.created_at {
                errors.add("start_at", "cannot precede the deal's creation time");
            }
        }
    }

    let published_changed = old.map_or(false, |o| o.published_at != next.published_at);
    let publishing = published_changed && next.published_at.is_some();

    if publishing {
        if facts.location_count < MINIMUM_LOCATION_COUNT {
            errors.add_base("at least one location is required to publish");
        }
        if facts.image_count < MINIMUM_IMAGE_COUNT {
            errors.add_base("at least one image is required to publish");
        }
        if next.collection_id.is_some() && !next.published_from_collection {
            errors.add_base("deal belongs to a collection and must be published through it");
        }
    } else if !published_changed {
        // Plain saves (and creation) may not touch a live or expired deal.
        if next.published_at.is_some() || next.expire_at < now {
            errors.add_base("cannot modify a live or expired deal");
        }
    }

    errors.into_result()
}

/// One `images` error per oversized attachment; runs independent of the
/// publishability checks.
pub fn check_image_sizes(errors: &mut ValidationErrors, byte_sizes: &[i64]) {
    for size in byte_sizes {
        if *size > MAXIMUM_ALLOWED_IMAGE_SIZE {
            errors.add(
                "images",
                format!("images over {MAXIMUM_ALLOWED_IMAGE_SIZE} bytes are not allowed"),
            );
        }
    }
}

impl Deal {
    pub fn status(&self, now: OffsetDateTime) -> DealStatus {
        if self.expire_at < now {
            DealStatus::Expired
        } else if self.published_at.is_some() {
            DealStatus::Published
        } else {
            DealStatus::Draft
        }
    }

    /// May go negative when oversold; callers decide what that means.
    pub fn quantity_left(&self, quantity_sold: i64) -> i64 {
        i64::from(self.maximum_purchases_allowed.unwrap_or(0)) - quantity_sold
    }

    /// Integer-truncated percentage. With an unset or zero denominator the
    /// float cast saturates: 0/0 reads as 0, n/0 as i64::MAX.
    pub fn percentage_sold(&self, quantity_sold: i64) -> i64 {
        let max = f64::from(self.maximum_purchases_allowed.unwrap_or(0));
        (quantity_sold as f64 / max * 100.0) as i64
    }

    pub fn minimum_criteria_met(&self, quantity_sold: i64) -> bool {
        quantity_sold >= i64::from(self.minimum_purchases_required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_750_000_000).unwrap()
    }

    fn attrs() -> DealAttrs {
        DealAttrs {
            title: "Half-price pizza".into(),
            price: Decimal::new(99_990, 2), // 999.90
            start_at: now() + Duration::days(1),
            expire_at: now() + Duration::days(10),
            minimum_purchases_required: 5,
            maximum_purchases_allowed: Some(100),
            maximum_purchases_per_customer: Some(10),
            published_at: None,
            collection_id: None,
            published_from_collection: false,
        }
    }

    fn deal() -> Deal {
        Deal {
            id: Uuid::new_v4(),
            title: "Half-price pizza".into(),
            description: None,
            instructions: None,
            start_at: now() + Duration::days(1),
            expire_at: now() + Duration::days(10),
            price: Decimal::new(99_990, 2),
            minimum_purchases_required: 5,
            maximum_purchases_allowed: Some(100),
            maximum_purchases_per_customer: Some(10),
            published_at: None,
            category_id: Uuid::new_v4(),
            collection_id: None,
            created_at: now() - Duration::hours(1),
            updated_at: now() - Duration::hours(1),
        }
    }

    fn facts() -> DealFacts {
        DealFacts {
            location_count: 1,
            image_count: 1,
        }
    }

    #[test]
    fn a_valid_create_passes() {
        assert!(validate_transition(None, &attrs(), &facts(), now()).is_ok());
    }

    #[test]
    fn price_inside_bounds_passes_and_outside_fails_with_bound_messages() {
        let mut next = attrs();
        next.price = Decimal::new(-2_000, 2); // -20.00
        let errors = validate_transition(None, &next, &facts(), now()).unwrap_err();
        assert_eq!(
            errors.field_messages("price"),
            ["must be greater than or equal to 0.01"]
        );

        next.price = Decimal::new(999_999_999, 2); // 9999999.99
        let errors = validate_transition(None, &next, &facts(), now()).unwrap_err();
        assert_eq!(
            errors.field_messages("price"),
            ["must be less than or equal to 9999.99"]
        );
    }

    #[test]
    fn price_bounds_are_inclusive() {
        let mut next = attrs();
        next.price = MIN_ALLOWED_PRICE;
        assert!(validate_transition(None, &next, &facts(), now()).is_ok());
        next.price = MAX_ALLOWED_PRICE;
        assert!(validate_transition(None, &next, &facts(), now()).is_ok());
    }

    #[test]
    fn blank_title_is_rejected() {
        let mut next = attrs();
        next.title = "   ".into();
        let errors = validate_transition(None, &next, &facts(), now()).unwrap_err();
        assert_eq!(errors.field_messages("title"), ["can't be blank"]);
    }

    #[test]
    fn expire_must_follow_start() {
        let mut next = attrs();
        next.expire_at = next.start_at;
        let errors = validate_transition(None, &next, &facts(), now()).unwrap_err();
        assert_eq!(errors.field_messages("expire_at"), ["must be after start_at"]);
    }

    #[test]
    fn create_requires_future_start() {
        let mut next = attrs();
        next.start_at = now() - Duration::minutes(1);
        let errors = validate_transition(None, &next, &facts(), now()).unwrap_err();
        assert_eq!(errors.field_messages("start_at"), ["must be in the future"]);
    }

    #[test]
    fn update_checks_start_against_creation_time_not_now() {
        let old = deal();
        let mut next = attrs();
        // Between the record's creation and "now": invalid on create, valid
        // on update.
        next.start_at = now() - Duration::minutes(30);
        next.expire_at = now() + Duration::days(10);
        assert!(validate_transition(Some(&old), &next, &facts(), now()).is_ok());

        next.start_at = old.created_at - Duration::minutes(1);
        let errors = validate_transition(Some(&old), &next, &facts(), now()).unwrap_err();
        assert_eq!(
            errors.field_messages("start_at"),
            ["cannot precede the deal's creation time"]
        );
    }

    #[test]
    fn purchase_count_bounds() {
        let mut next = attrs();
        next.minimum_purchases_required = -1;
        assert!(validate_transition(None, &next, &facts(), now()).is_err());

        let mut next = attrs();
        next.maximum_purchases_allowed = Some(5);
        next.minimum_purchases_required = 5;
        let errors = validate_transition(None, &next, &facts(), now()).unwrap_err();
        assert_eq!(
            errors.field_messages("maximum_purchases_allowed"),
            ["must be greater than minimum_purchases_required"]
        );

        let mut next = attrs();
        next.maximum_purchases_per_customer = Some(101);
        let errors = validate_transition(None, &next, &facts(), now()).unwrap_err();
        assert_eq!(
            errors.field_messages("maximum_purchases_per_customer"),
            ["must be less than or equal to maximum_purchases_allowed"]
        );

        // Per-customer cap equal to the overall cap is allowed.
        let mut next = attrs();
        next.maximum_purchases_per_customer = Some(100);
        assert!(validate_transition(None, &next, &facts(), now()).is_ok());
    }

    #[test]
    fn publishing_without_locations_or_images_fails_with_base_errors() {
        let old = deal();
        let mut next = attrs();
        next.published_at = Some(now());
        let no_facts = DealFacts {
            location_count: 0,
            image_count: 0,
        };
        let errors = validate_transition(Some(&old), &next, &no_facts, now()).unwrap_err();
        assert!(errors
            .base
            .contains(&"at least one location is required to publish".to_string()));
        assert!(errors
            .base
            .contains(&"at least one image is required to publish".to_string()));

        // Same transition with a location and an image attached succeeds.
        assert!(validate_transition(Some(&old), &next, &facts(), now()).is_ok());
    }

    #[test]
    fn collection_deals_publish_only_through_their_collection() {
        let old = deal();
        let mut next = attrs();
        next.published_at = Some(now());
        next.collection_id = Some(Uuid::new_v4());
        let errors = validate_transition(Some(&old), &next, &facts(), now()).unwrap_err();
        assert!(errors
            .base
            .contains(&"deal belongs to a collection and must be published through it".to_string()));

        next.published_from_collection = true;
        assert!(validate_transition(Some(&old), &next, &facts(), now()).is_ok());
    }

    #[test]
    fn collection_flag_does_not_suppress_location_and_image_checks() {
        let old = deal();
        let mut next = attrs();
        next.published_at = Some(now());
        next.collection_id = Some(Uuid::new_v4());
        next.published_from_collection = true;
        let no_facts = DealFacts {
            location_count: 0,
            image_count: 0,
        };
        let errors = validate_transition(Some(&old), &next, &no_facts, now()).unwrap_err();
        assert_eq!(errors.base.len(), 2);
    }

    #[test]
    fn updating_a_live_deal_fails_unless_publish_state_changes() {
        let mut old = deal();
        old.published_at = Some(now() - Duration::minutes(5));
        let mut next = attrs();
        next.published_at = old.published_at;
        let errors = validate_transition(Some(&old), &next, &facts(), now()).unwrap_err();
        assert!(errors
            .base
            .contains(&"cannot modify a live or expired deal".to_string()));

        // The identical update on an unpublished deal succeeds.
        let old = deal();
        let mut next = attrs();
        next.published_at = None;
        assert!(validate_transition(Some(&old), &next, &facts(), now()).is_ok());
    }

    #[test]
    fn updating_an_expired_deal_fails() {
        let mut old = deal();
        old.created_at = now() - Duration::days(30);
        let mut next = attrs();
        next.start_at = now() - Duration::days(20);
        next.expire_at = now() - Duration::days(1);
        let errors = validate_transition(Some(&old), &next, &facts(), now()).unwrap_err();
        assert!(errors
            .base
            .contains(&"cannot modify a live or expired deal".to_string()));
    }

    #[test]
    fn creating_an_already_published_deal_is_rejected() {
        let mut next = attrs();
        next.published_at = Some(now());
        let errors = validate_transition(None, &next, &facts(), now()).unwrap_err();
        assert!(errors
            .base
            .contains(&"cannot modify a live or expired deal".to_string()));
    }

    #[test]
    fn unpublishing_skips_the_live_gate() {
        let mut old = deal();
        old.published_at = Some(now() - Duration::minutes(5));
        let mut next = attrs();
        next.published_at = None;
        assert!(validate_transition(Some(&old), &next, &facts(), now()).is_ok());
    }

    #[test]
    fn oversized_images_record_one_error_each() {
        let mut errors = ValidationErrors::new();
        check_image_sizes(&mut errors, &[50_000, 100_000, 100_001, 250_000]);
        assert_eq!(errors.field_messages("images").len(), 2);
    }

    #[test]
    fn status_reads_draft_published_expired() {
        let mut d = deal();
        assert_eq!(d.status(now()), DealStatus::Draft);
        d.published_at = Some(now());
        assert_eq!(d.status(now()), DealStatus::Published);
        assert_eq!(d.status(now() + Duration::days(11)), DealStatus::Expired);
    }

    #[test]
    fn quantity_left_is_max_minus_sold_and_may_go_negative() {
        let d = deal();
        assert_eq!(d.quantity_left(0), 100);
        assert_eq!(d.quantity_left(40), 60);
        assert_eq!(d.quantity_left(120), -20);
    }

    #[test]
    fn percentage_sold_truncates() {
        let d = deal();
        assert_eq!(d.percentage_sold(33), 33);
        assert_eq!(d.percentage_sold(1), 1);
        let mut d = deal();
        d.maximum_purchases_allowed = Some(3);
        assert_eq!(d.percentage_sold(2), 66);
    }

    #[test]
    fn percentage_sold_with_unset_denominator_saturates() {
        let mut d = deal();
        d.maximum_purchases_allowed = None;
        assert_eq!(d.percentage_sold(0), 0); // NaN saturates to 0
        assert_eq!(d.percentage_sold(5), i64::MAX); // +inf saturates
    }

    #[test]
    fn minimum_criteria_compares_sold_to_required() {
        let d = deal();
        assert!(!d.minimum_criteria_met(4));
        assert!(d.minimum_criteria_met(5));
        assert!(d.minimum_criteria_met(6));
    }
}
