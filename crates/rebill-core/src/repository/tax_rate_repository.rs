//! Tax Rate Repository

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::{CreateTaxRateRequest, TaxRate};
use crate::Result;

/// Tax rate repository trait
#[async_trait]
pub trait TaxRateRepository: Send + Sync {
    async fn create(&self, app_id: &str, request: &CreateTaxRateRequest) -> Result<TaxRate>;

    async fn list(&self, app_id: &str) -> Result<Vec<TaxRate>>;

    async fn list_for_jurisdiction(
        &self,
        app_id: &str,
        jurisdiction_code: &str,
    ) -> Result<Vec<TaxRate>>;

    /// Append a tax audit row
    async fn record_calculation(
        &self,
        app_id: &str,
        invoice_id: Option<&str>,
        charge_id: Option<Uuid>,
        jurisdiction_code: &str,
        taxable_cents: i64,
        tax_cents: i64,
        breakdown: &serde_json::Value,
    ) -> Result<()>;
}

/// PostgreSQL implementation of TaxRateRepository
pub struct PgTaxRateRepository {
    pool: Pool<Postgres>,
}

impl PgTaxRateRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaxRateRepository for PgTaxRateRepository {
    async fn create(&self, app_id: &str, request: &CreateTaxRateRequest) -> Result<TaxRate> {
        let rate = sqlx::query_as::<_, TaxRate>(
            r#"
            INSERT INTO tax_rates
                (app_id, jurisdiction_code, tax_type, rate, effective_date, expiration_date, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(&request.jurisdiction_code)
        .bind(&request.tax_type)
        .bind(request.rate)
        .bind(request.effective_date)
        .bind(request.expiration_date)
        .bind(&request.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(rate)
    }

    async fn list(&self, app_id: &str) -> Result<Vec<TaxRate>> {
        let rates = sqlx::query_as::<_, TaxRate>(
            "SELECT * FROM tax_rates WHERE app_id = $1 ORDER BY jurisdiction_code, effective_date DESC",
        )
        .bind(app_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rates)
    }

    async fn list_for_jurisdiction(
        &self,
        app_id: &str,
        jurisdiction_code: &str,
    ) -> Result<Vec<TaxRate>> {
        let rates = sqlx::query_as::<_, TaxRate>(
            "SELECT * FROM tax_rates WHERE app_id = $1 AND jurisdiction_code = $2",
        )
        .bind(app_id)
        .bind(jurisdiction_code)
        .fetch_all(&self.pool)
        .await?;

        Ok(rates)
    }

    async fn record_calculation(
        &self,
        app_id: &str,
        invoice_id: Option<&str>,
        charge_id: Option<Uuid>,
        jurisdiction_code: &str,
        taxable_cents: i64,
        tax_cents: i64,
        breakdown: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tax_calculations
                (app_id, invoice_id, charge_id, jurisdiction_code, taxable_cents, tax_cents, breakdown)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(app_id)
        .bind(invoice_id)
        .bind(charge_id)
        .bind(jurisdiction_code)
        .bind(taxable_cents)
        .bind(tax_cents)
        .bind(breakdown)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
