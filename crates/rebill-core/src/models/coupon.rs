//! Coupon model
//!
//! Coupons are app-scoped reference data. The stacking and eligibility
//! rules live in the discount calculator; this module only carries the
//! persisted shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Discount type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "coupon_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CouponType {
    /// Percentage off; `value` is whole percent (20 = 20%)
    Percentage,
    /// Fixed amount off; `value` is cents
    Fixed,
    /// Tiered percentage by total quantity; tiers in `volume_tiers`
    Volume,
    /// Referral credit; `value` is cents
    Referral,
    /// Contract-negotiated percentage
    Contract,
}

/// Volume discount tier. Percent applies when
/// `min <= quantity` and (`max` unset or `quantity <= max`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeTier {
    pub min: i64,
    pub max: Option<i64>,
    pub percent: i64,
}

/// Coupon entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Coupon {
    pub id: Uuid,
    pub app_id: String,
    pub code: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub coupon_type: CouponType,
    pub value: i64,
    pub active: bool,
    pub redeem_by: Option<DateTime<Utc>>,
    pub max_redemptions: Option<i32>,
    pub redemption_count: i32,
    /// JSON array of category strings
    pub product_categories: Option<serde_json::Value>,
    /// JSON array of segment strings
    pub customer_segments: Option<serde_json::Value>,
    pub min_quantity: Option<i32>,
    pub max_discount_cents: Option<i64>,
    pub seasonal_start: Option<DateTime<Utc>>,
    pub seasonal_end: Option<DateTime<Utc>>,
    /// JSON array of `VolumeTier`
    pub volume_tiers: Option<serde_json::Value>,
    pub stackable: bool,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    pub fn categories(&self) -> Vec<String> {
        json_string_array(self.product_categories.as_ref())
    }

    pub fn segments(&self) -> Vec<String> {
        json_string_array(self.customer_segments.as_ref())
    }

    pub fn tiers(&self) -> Vec<VolumeTier> {
        self.volume_tiers
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

fn json_string_array(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// Create coupon request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,

    #[serde(rename = "type")]
    pub coupon_type: CouponType,

    pub value: i64,
    pub redeem_by: Option<DateTime<Utc>>,
    pub max_redemptions: Option<i32>,
    pub product_categories: Option<Vec<String>>,
    pub customer_segments: Option<Vec<String>>,
    pub min_quantity: Option<i32>,
    pub max_discount_cents: Option<i64>,
    pub seasonal_start: Option<DateTime<Utc>>,
    pub seasonal_end: Option<DateTime<Utc>>,
    pub volume_tiers: Option<Vec<VolumeTier>>,
    #[serde(default)]
    pub stackable: bool,
    #[serde(default)]
    pub priority: i32,
}

/// Update coupon request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateCouponRequest {
    pub active: Option<bool>,
    pub value: Option<i64>,
    pub redeem_by: Option<DateTime<Utc>>,
    pub max_redemptions: Option<i32>,
    pub max_discount_cents: Option<i64>,
    pub priority: Option<i32>,
    pub stackable: Option<bool>,
}
