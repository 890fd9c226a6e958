//! Subscription Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::{
    IntervalUnit, PaymentMethodType, Subscription, SubscriptionStatus, UpdateSubscriptionRequest,
};
use crate::{Error, Result};

/// Insert payload for a subscription row
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub customer_id: Uuid,
    pub psp_subscription_id: Option<String>,
    pub plan_id: String,
    pub plan_name: String,
    pub price_cents: i64,
    pub status: SubscriptionStatus,
    pub interval_unit: IntervalUnit,
    pub interval_count: i32,
    pub billing_cycle_anchor: Option<DateTime<Utc>>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub payment_method_token: String,
    pub payment_method_type: PaymentMethodType,
    pub metadata: serde_json::Value,
}

/// Status fields a `subscription.updated` webhook may carry
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSync {
    pub status: Option<SubscriptionStatus>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: Option<bool>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Subscription repository trait
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(&self, app_id: &str, subscription: &NewSubscription) -> Result<Subscription>;

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Subscription>>;

    async fn find_by_psp_id(
        &self,
        app_id: &str,
        psp_subscription_id: &str,
    ) -> Result<Option<Subscription>>;

    async fn list(&self, app_id: &str, customer_id: Option<Uuid>) -> Result<Vec<Subscription>>;

    /// Whitelisted field update; interval fields never change here
    async fn update(
        &self,
        app_id: &str,
        id: Uuid,
        request: &UpdateSubscriptionRequest,
    ) -> Result<Subscription>;

    async fn set_cancel_at_period_end(&self, app_id: &str, id: Uuid) -> Result<Subscription>;

    async fn cancel_now(&self, app_id: &str, id: Uuid, now: DateTime<Utc>)
        -> Result<Subscription>;

    /// Single-transaction billing-cycle swap: the old subscription is
    /// marked canceled/ended and the replacement row is inserted. Either
    /// both persist or neither.
    async fn swap_cycle(
        &self,
        app_id: &str,
        old_id: Uuid,
        replacement: &NewSubscription,
        now: DateTime<Utc>,
    ) -> Result<Subscription>;

    /// Idempotent webhook sync by PSP id
    async fn sync_by_psp_id(
        &self,
        app_id: &str,
        psp_subscription_id: &str,
        sync: &SubscriptionSync,
    ) -> Result<Option<Subscription>>;

    /// Append a proration audit row
    async fn record_proration_event(
        &self,
        app_id: &str,
        subscription_id: Uuid,
        kind: &str,
        amount_cents: i64,
        metadata: &serde_json::Value,
    ) -> Result<()>;
}

/// PostgreSQL implementation of SubscriptionRepository
pub struct PgSubscriptionRepository {
    pool: Pool<Postgres>,
}

impl PgSubscriptionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

const INSERT_SQL: &str = r#"
    INSERT INTO subscriptions
        (app_id, customer_id, psp_subscription_id, plan_id, plan_name, price_cents,
         status, interval_unit, interval_count, billing_cycle_anchor,
         current_period_start, current_period_end, payment_method_token,
         payment_method_type, metadata)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
    RETURNING *
"#;

fn bind_new<'q>(
    query: sqlx::query::QueryAs<'q, Postgres, Subscription, sqlx::postgres::PgArguments>,
    app_id: &'q str,
    sub: &'q NewSubscription,
) -> sqlx::query::QueryAs<'q, Postgres, Subscription, sqlx::postgres::PgArguments> {
    query
        .bind(app_id)
        .bind(sub.customer_id)
        .bind(&sub.psp_subscription_id)
        .bind(&sub.plan_id)
        .bind(&sub.plan_name)
        .bind(sub.price_cents)
        .bind(sub.status)
        .bind(sub.interval_unit)
        .bind(sub.interval_count)
        .bind(sub.billing_cycle_anchor)
        .bind(sub.current_period_start)
        .bind(sub.current_period_end)
        .bind(&sub.payment_method_token)
        .bind(sub.payment_method_type)
        .bind(&sub.metadata)
}

#[async_trait]
impl SubscriptionRepository for PgSubscriptionRepository {
    async fn create(&self, app_id: &str, subscription: &NewSubscription) -> Result<Subscription> {
        let query = sqlx::query_as::<_, Subscription>(INSERT_SQL);
        let subscription = bind_new(query, app_id, subscription)
            .fetch_one(&self.pool)
            .await?;

        Ok(subscription)
    }

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE app_id = $1 AND id = $2",
        )
        .bind(app_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn find_by_psp_id(
        &self,
        app_id: &str,
        psp_subscription_id: &str,
    ) -> Result<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE app_id = $1 AND psp_subscription_id = $2",
        )
        .bind(app_id)
        .bind(psp_subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn list(&self, app_id: &str, customer_id: Option<Uuid>) -> Result<Vec<Subscription>> {
        let subscriptions = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT * FROM subscriptions
            WHERE app_id = $1 AND ($2::uuid IS NULL OR customer_id = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(app_id)
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(subscriptions)
    }

    async fn update(
        &self,
        app_id: &str,
        id: Uuid,
        request: &UpdateSubscriptionRequest,
    ) -> Result<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions
            SET plan_id = COALESCE($3, plan_id),
                plan_name = COALESCE($4, plan_name),
                price_cents = COALESCE($5, price_cents),
                metadata = COALESCE($6, metadata),
                updated_at = NOW()
            WHERE app_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(id)
        .bind(&request.plan_id)
        .bind(&request.plan_name)
        .bind(request.price_cents)
        .bind(&request.metadata)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Subscription not found"))?;

        Ok(subscription)
    }

    async fn set_cancel_at_period_end(&self, app_id: &str, id: Uuid) -> Result<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions
            SET cancel_at_period_end = TRUE,
                cancel_at = current_period_end,
                updated_at = NOW()
            WHERE app_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Subscription not found"))?;

        Ok(subscription)
    }

    async fn cancel_now(
        &self,
        app_id: &str,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions
            SET status = 'canceled', canceled_at = $3, ended_at = $3, updated_at = NOW()
            WHERE app_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Subscription not found"))?;

        Ok(subscription)
    }

    async fn swap_cycle(
        &self,
        app_id: &str,
        old_id: Uuid,
        replacement: &NewSubscription,
        now: DateTime<Utc>,
    ) -> Result<Subscription> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'canceled', canceled_at = $3, ended_at = $3, updated_at = NOW()
            WHERE app_id = $1 AND id = $2
            "#,
        )
        .bind(app_id)
        .bind(old_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(Error::not_found("Subscription not found"));
        }

        let query = sqlx::query_as::<_, Subscription>(INSERT_SQL);
        let subscription = bind_new(query, app_id, replacement)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(subscription)
    }

    async fn sync_by_psp_id(
        &self,
        app_id: &str,
        psp_subscription_id: &str,
        sync: &SubscriptionSync,
    ) -> Result<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions
            SET status = COALESCE($3, status),
                current_period_start = COALESCE($4, current_period_start),
                current_period_end = COALESCE($5, current_period_end),
                cancel_at_period_end = COALESCE($6, cancel_at_period_end),
                canceled_at = COALESCE($7, canceled_at),
                ended_at = COALESCE($8, ended_at),
                updated_at = NOW()
            WHERE app_id = $1 AND psp_subscription_id = $2
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(psp_subscription_id)
        .bind(sync.status)
        .bind(sync.current_period_start)
        .bind(sync.current_period_end)
        .bind(sync.cancel_at_period_end)
        .bind(sync.canceled_at)
        .bind(sync.ended_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn record_proration_event(
        &self,
        app_id: &str,
        subscription_id: Uuid,
        kind: &str,
        amount_cents: i64,
        metadata: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO proration_events (app_id, subscription_id, kind, amount_cents, metadata)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(app_id)
        .bind(subscription_id)
        .bind(kind)
        .bind(amount_cents)
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
