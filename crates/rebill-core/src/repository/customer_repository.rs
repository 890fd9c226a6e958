//! Customer Repository

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::{CreateCustomerRequest, Customer, CustomerStatus, UpdateCustomerRequest};
use crate::{Error, Result};

use super::map_unique;

/// Customer repository trait
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn create(&self, app_id: &str, request: &CreateCustomerRequest) -> Result<Customer>;

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Customer>>;

    async fn find_by_external_id(
        &self,
        app_id: &str,
        external_customer_id: &str,
    ) -> Result<Option<Customer>>;

    async fn find_by_psp_id(&self, app_id: &str, psp_customer_id: &str)
        -> Result<Option<Customer>>;

    async fn update(
        &self,
        app_id: &str,
        id: Uuid,
        request: &UpdateCustomerRequest,
    ) -> Result<Customer>;

    /// Backfill the PSP customer id after a local-first create
    async fn set_psp_customer_id(
        &self,
        app_id: &str,
        id: Uuid,
        psp_customer_id: &str,
    ) -> Result<()>;

    async fn set_status(&self, app_id: &str, id: Uuid, status: CustomerStatus) -> Result<()>;

    /// Clear the denormalized default-method fast path
    async fn clear_default_payment_method(&self, app_id: &str, id: Uuid) -> Result<()>;
}

/// PostgreSQL implementation of CustomerRepository
pub struct PgCustomerRepository {
    pool: Pool<Postgres>,
}

impl PgCustomerRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerRepository for PgCustomerRepository {
    async fn create(&self, app_id: &str, request: &CreateCustomerRequest) -> Result<Customer> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (app_id, external_customer_id, email, name, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(&request.external_customer_id)
        .bind(&request.email)
        .bind(&request.name)
        .bind(request.metadata.clone().unwrap_or_else(|| serde_json::json!({})))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, "customer with this external_customer_id already exists"))?;

        Ok(customer)
    }

    async fn find_by_id(&self, app_id: &str, id: Uuid) -> Result<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE app_id = $1 AND id = $2",
        )
        .bind(app_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn find_by_external_id(
        &self,
        app_id: &str,
        external_customer_id: &str,
    ) -> Result<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE app_id = $1 AND external_customer_id = $2",
        )
        .bind(app_id)
        .bind(external_customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn find_by_psp_id(
        &self,
        app_id: &str,
        psp_customer_id: &str,
    ) -> Result<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE app_id = $1 AND psp_customer_id = $2",
        )
        .bind(app_id)
        .bind(psp_customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn update(
        &self,
        app_id: &str,
        id: Uuid,
        request: &UpdateCustomerRequest,
    ) -> Result<Customer> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers
            SET email = COALESCE($3, email),
                name = COALESCE($4, name),
                metadata = COALESCE($5, metadata),
                updated_at = NOW()
            WHERE app_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(app_id)
        .bind(id)
        .bind(&request.email)
        .bind(&request.name)
        .bind(&request.metadata)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Customer not found"))?;

        Ok(customer)
    }

    async fn set_psp_customer_id(
        &self,
        app_id: &str,
        id: Uuid,
        psp_customer_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE customers SET psp_customer_id = $3, updated_at = NOW() WHERE app_id = $1 AND id = $2",
        )
        .bind(app_id)
        .bind(id)
        .bind(psp_customer_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_status(&self, app_id: &str, id: Uuid, status: CustomerStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE customers
            SET status = $3,
                delinquent_since = CASE WHEN $3 = 'delinquent'::customer_status
                                        THEN COALESCE(delinquent_since, NOW())
                                        ELSE NULL END,
                updated_at = NOW()
            WHERE app_id = $1 AND id = $2
            "#,
        )
        .bind(app_id)
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_default_payment_method(&self, app_id: &str, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE customers
            SET default_payment_method_token = NULL,
                default_payment_method_type = NULL,
                updated_at = NOW()
            WHERE app_id = $1 AND id = $2
            "#,
        )
        .bind(app_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
