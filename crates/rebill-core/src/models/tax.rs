use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Jurisdiction tax rate. `rate` is a fraction in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaxRate {
    pub id: Uuid,
    pub app_id: String,
    pub jurisdiction_code: String,
    pub tax_type: String,
    pub rate: f64,
    pub effective_date: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaxRate {
    /// Active when `effective_date <= now` and not yet expired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.effective_date <= now
            && self.expiration_date.map_or(true, |exp| now < exp)
    }
}

/// Create tax rate request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTaxRateRequest {
    #[validate(length(min = 1, max = 32))]
    pub jurisdiction_code: String,

    #[validate(length(min = 1, max = 32))]
    pub tax_type: String,

    #[validate(range(min = 0.0, max = 1.0))]
    pub rate: f64,

    pub effective_date: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,

    #[validate(length(max = 255))]
    pub description: Option<String>,
}
