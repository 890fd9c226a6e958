//! Payment Method Repository

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::{PaymentMethod, PaymentMethodType};
use crate::{Error, Result};

/// Masked fields fetched from the PSP at attach time
#[derive(Debug, Clone, Default)]
pub struct MaskedDetails {
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub bank_name: Option<String>,
    pub bank_last4: Option<String>,
}

/// Payment method repository trait
#[async_trait]
pub trait PaymentMethodRepository: Send + Sync {
    /// Insert or re-attach by PSP token. A soft-deleted row for the same
    /// token comes back with `deleted_at` cleared.
    async fn upsert_by_psp_id(
        &self,
        app_id: &str,
        customer_id: Uuid,
        psp_payment_method_id: &str,
        method_type: PaymentMethodType,
        details: &MaskedDetails,
    ) -> Result<PaymentMethod>;

    async fn find_by_psp_id(
        &self,
        app_id: &str,
        psp_payment_method_id: &str,
    ) -> Result<Option<PaymentMethod>>;

    /// Active methods only, default first then newest first
    async fn list_active(&self, app_id: &str, customer_id: Uuid) -> Result<Vec<PaymentMethod>>;

    /// Soft delete: sets `deleted_at`, clears `is_default`. Returns the
    /// deleted row.
    async fn soft_delete(&self, app_id: &str, psp_payment_method_id: &str)
        -> Result<PaymentMethod>;

    /// Atomically make this method the customer's default: clear the flag
    /// on every sibling, set it here, and update the customer's
    /// denormalized fast path. All in one transaction.
    async fn set_default(
        &self,
        app_id: &str,
        customer_id: Uuid,
        psp_payment_method_id: &str,
    ) -> Result<PaymentMethod>;
}

/// PostgreSQL implementation of PaymentMethodRepository
pub struct PgPaymentMethodRepository {
    pool: Pool<Postgres>,
}

impl PgPaymentMethodRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentMethodRepository for PgPaymentMethodRepository {
    async fn upsert_by_psp_id(
        &self,
        app_id: &str,
        customer_id: Uuid,
        psp_payment_method_id: &str,
        method_type: PaymentMethodType,
        details: &MaskedDetails,
    ) -> Result<PaymentMethod> {
        let method = sqlx::query_as::<_, PaymentMethod>(
            r#"
            INSERT INTO payment_methods
                (app_id, customer_id, psp_payment_method_id, type, brand, last4,
                 exp_month, exp_year, bank_name, bank_last4)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (psp_payment_method_id) DO UPDATE
            SET customer_id = EXCLUDED.customer_id,
                type = EXCLUDED.type,
                brand = COALESCE(EXCLUDED.brand, payment_methods.brand),
                last4 = COALESCE(EXCLUDED.last4, payment_methods.last4),
                exp_month = COALESCE(EXCLUDED.exp_month, payment_methods.exp_month),
                exp_year = COALESCE(EXCLUDED.exp_year, payment_methods.exp_year),
                bank_name = COALESCE(EXCLUDED.bank_name, payment_methods.bank_name),
                bank_last4 = COALESCE(EXCLUDED.bank_last4, payment_methods.bank_last4),
                deleted_at = NULL,
                updated_at = NOW()
            WHERE payment_methods.app_id = $1
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(customer_id)
        .bind(psp_payment_method_id)
        .bind(method_type)
        .bind(&details.brand)
        .bind(&details.last4)
        .bind(details.exp_month)
        .bind(details.exp_year)
        .bind(&details.bank_name)
        .bind(&details.bank_last4)
        .fetch_one(&self.pool)
        .await?;

        Ok(method)
    }

    async fn find_by_psp_id(
        &self,
        app_id: &str,
        psp_payment_method_id: &str,
    ) -> Result<Option<PaymentMethod>> {
        let method = sqlx::query_as::<_, PaymentMethod>(
            "SELECT * FROM payment_methods WHERE app_id = $1 AND psp_payment_method_id = $2",
        )
        .bind(app_id)
        .bind(psp_payment_method_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(method)
    }

    async fn list_active(&self, app_id: &str, customer_id: Uuid) -> Result<Vec<PaymentMethod>> {
        let methods = sqlx::query_as::<_, PaymentMethod>(
            r#"
            SELECT * FROM payment_methods
            WHERE app_id = $1 AND customer_id = $2 AND deleted_at IS NULL
            ORDER BY is_default DESC, created_at DESC
            "#,
        )
        .bind(app_id)
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(methods)
    }

    async fn soft_delete(
        &self,
        app_id: &str,
        psp_payment_method_id: &str,
    ) -> Result<PaymentMethod> {
        let method = sqlx::query_as::<_, PaymentMethod>(
            r#"
            UPDATE payment_methods
            SET deleted_at = NOW(), is_default = FALSE, updated_at = NOW()
            WHERE app_id = $1 AND psp_payment_method_id = $2 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(psp_payment_method_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Payment method not found"))?;

        Ok(method)
    }

    async fn set_default(
        &self,
        app_id: &str,
        customer_id: Uuid,
        psp_payment_method_id: &str,
    ) -> Result<PaymentMethod> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE payment_methods SET is_default = FALSE, updated_at = NOW() WHERE app_id = $1 AND customer_id = $2",
        )
        .bind(app_id)
        .bind(customer_id)
        .execute(&mut *tx)
        .await?;

        let method = sqlx::query_as::<_, PaymentMethod>(
            r#"
            UPDATE payment_methods
            SET is_default = TRUE, updated_at = NOW()
            WHERE app_id = $1 AND customer_id = $2 AND psp_payment_method_id = $3
                  AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(customer_id)
        .bind(psp_payment_method_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found("Payment method not found"))?;

        sqlx::query(
            r#"
            UPDATE customers
            SET default_payment_method_token = $3,
                default_payment_method_type = $4,
                updated_at = NOW()
            WHERE app_id = $1 AND id = $2
            "#,
        )
        .bind(app_id)
        .bind(customer_id)
        .bind(psp_payment_method_id)
        .bind(method.method_type)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(method)
    }
}
