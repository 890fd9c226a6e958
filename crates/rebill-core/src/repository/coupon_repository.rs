//! Coupon Repository

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::{Coupon, CreateCouponRequest, UpdateCouponRequest};
use crate::{Error, Result};

use super::map_unique;

/// Coupon repository trait
#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn create(&self, app_id: &str, request: &CreateCouponRequest) -> Result<Coupon>;

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Coupon>>;

    async fn find_by_code(&self, app_id: &str, code: &str) -> Result<Option<Coupon>>;

    async fn find_by_codes(&self, app_id: &str, codes: &[String]) -> Result<Vec<Coupon>>;

    async fn list(&self, app_id: &str) -> Result<Vec<Coupon>>;

    async fn update(
        &self,
        app_id: &str,
        id: Uuid,
        request: &UpdateCouponRequest,
    ) -> Result<Coupon>;

    async fn increment_redemptions(&self, app_id: &str, id: Uuid) -> Result<()>;

    /// Append a discount audit row
    async fn record_application(
        &self,
        app_id: &str,
        coupon_id: Uuid,
        coupon_code: &str,
        invoice_id: Option<&str>,
        charge_id: Option<Uuid>,
        subtotal_cents: i64,
        discount_cents: i64,
    ) -> Result<()>;
}

/// PostgreSQL implementation of CouponRepository
pub struct PgCouponRepository {
    pool: Pool<Postgres>,
}

impl PgCouponRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CouponRepository for PgCouponRepository {
    async fn create(&self, app_id: &str, request: &CreateCouponRequest) -> Result<Coupon> {
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            INSERT INTO coupons
                (app_id, code, type, value, redeem_by, max_redemptions, product_categories,
                 customer_segments, min_quantity, max_discount_cents, seasonal_start,
                 seasonal_end, volume_tiers, stackable, priority)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(&request.code)
        .bind(request.coupon_type)
        .bind(request.value)
        .bind(request.redeem_by)
        .bind(request.max_redemptions)
        .bind(request.product_categories.as_ref().map(|v| serde_json::json!(v)))
        .bind(request.customer_segments.as_ref().map(|v| serde_json::json!(v)))
        .bind(request.min_quantity)
        .bind(request.max_discount_cents)
        .bind(request.seasonal_start)
        .bind(request.seasonal_end)
        .bind(
            request
                .volume_tiers
                .as_ref()
                .map(|v| serde_json::to_value(v).unwrap_or_default()),
        )
        .bind(request.stackable)
        .bind(request.priority)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, "coupon code already exists"))?;

        Ok(coupon)
    }

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Coupon>> {
        let coupon =
            sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE app_id = $1 AND id = $2")
                .bind(app_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(coupon)
    }

    async fn find_by_code(&self, app_id: &str, code: &str) -> Result<Option<Coupon>> {
        let coupon =
            sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE app_id = $1 AND code = $2")
                .bind(app_id)
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;

        Ok(coupon)
    }

    async fn find_by_codes(&self, app_id: &str, codes: &[String]) -> Result<Vec<Coupon>> {
        let coupons = sqlx::query_as::<_, Coupon>(
            "SELECT * FROM coupons WHERE app_id = $1 AND code = ANY($2)",
        )
        .bind(app_id)
        .bind(codes)
        .fetch_all(&self.pool)
        .await?;

        Ok(coupons)
    }

    async fn list(&self, app_id: &str) -> Result<Vec<Coupon>> {
        let coupons = sqlx::query_as::<_, Coupon>(
            "SELECT * FROM coupons WHERE app_id = $1 ORDER BY created_at DESC",
        )
        .bind(app_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(coupons)
    }

    async fn update(
        &self,
        app_id: &str,
        id: Uuid,
        request: &UpdateCouponRequest,
    ) -> Result<Coupon> {
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            UPDATE coupons
            SET active = COALESCE($3, active),
                value = COALESCE($4, value),
                redeem_by = COALESCE($5, redeem_by),
                max_redemptions = COALESCE($6, max_redemptions),
                max_discount_cents = COALESCE($7, max_discount_cents),
                priority = COALESCE($8, priority),
                stackable = COALESCE($9, stackable),
                updated_at = NOW()
            WHERE app_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(id)
        .bind(request.active)
        .bind(request.value)
        .bind(request.redeem_by)
        .bind(request.max_redemptions)
        .bind(request.max_discount_cents)
        .bind(request.priority)
        .bind(request.stackable)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Coupon not found"))?;

        Ok(coupon)
    }

    async fn increment_redemptions(&self, app_id: &str, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE coupons SET redemption_count = redemption_count + 1, updated_at = NOW() WHERE app_id = $1 AND id = $2",
        )
        .bind(app_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_application(
        &self,
        app_id: &str,
        coupon_id: Uuid,
        coupon_code: &str,
        invoice_id: Option<&str>,
        charge_id: Option<Uuid>,
        subtotal_cents: i64,
        discount_cents: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO discount_applications
                (app_id, coupon_id, coupon_code, invoice_id, charge_id, subtotal_cents, discount_cents)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(app_id)
        .bind(coupon_id)
        .bind(coupon_code)
        .bind(invoice_id)
        .bind(charge_id)
        .bind(subtotal_cents)
        .bind(discount_cents)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
