//! Tax calculator
//!
//! Sums jurisdiction rates over a taxable amount. Rates are converted to
//! integer parts-per-million before multiplication so the result is
//! deterministic across platforms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Customer, TaxRate};

use super::mul_ratio_round;

const PPM: i64 = 1_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxLine {
    pub tax_type: String,
    pub rate: f64,
    pub tax_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxOutcome {
    pub jurisdiction_code: Option<String>,
    pub taxable_cents: i64,
    pub total_tax_cents: i64,
    pub lines: Vec<TaxLine>,
    pub exempt: bool,
}

/// Resolve the customer's jurisdiction: explicit override first, then
/// customer metadata (`jurisdiction_code`, then `state`).
pub fn resolve_jurisdiction(override_code: Option<&str>, customer: &Customer) -> Option<String> {
    override_code
        .map(|c| c.to_string())
        .or_else(|| customer.jurisdiction_code())
}

/// Compute tax on a (discounted) subtotal.
///
/// `rates` should already be scoped to the resolved jurisdiction; inactive
/// rates and rates the customer is exempt from are skipped here.
pub fn calculate_tax(
    taxable_cents: i64,
    jurisdiction_code: Option<String>,
    rates: &[TaxRate],
    customer: &Customer,
    now: DateTime<Utc>,
) -> TaxOutcome {
    let mut lines = Vec::new();
    let mut total = 0i64;
    let mut any_exempt = false;

    for rate in rates {
        if !rate.is_active(now) {
            continue;
        }
        if customer.is_tax_exempt(&rate.tax_type) {
            any_exempt = true;
            continue;
        }

        let rate_ppm = (rate.rate * PPM as f64).round() as i64;
        let tax_cents = mul_ratio_round(taxable_cents, rate_ppm, PPM);
        total += tax_cents;
        lines.push(TaxLine {
            tax_type: rate.tax_type.clone(),
            rate: rate.rate,
            tax_cents,
        });
    }

    let exempt = any_exempt && lines.is_empty();

    TaxOutcome {
        jurisdiction_code,
        taxable_cents,
        total_tax_cents: total,
        lines,
        exempt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap()
    }

    fn rate(jurisdiction: &str, tax_type: &str, fraction: f64) -> TaxRate {
        TaxRate {
            id: Uuid::new_v4(),
            app_id: "acme".to_string(),
            jurisdiction_code: jurisdiction.to_string(),
            tax_type: tax_type.to_string(),
            rate: fraction,
            effective_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            expiration_date: None,
            description: None,
            created_at: now(),
        }
    }

    fn customer(metadata: serde_json::Value) -> Customer {
        Customer {
            id: Uuid::new_v4(),
            app_id: "acme".to_string(),
            external_customer_id: Some("C1".to_string()),
            psp_customer_id: None,
            email: "c1@example.com".to_string(),
            name: "C One".to_string(),
            default_payment_method_token: None,
            default_payment_method_type: None,
            status: crate::models::CustomerStatus::Active,
            delinquent_since: None,
            metadata,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_ca_sales_tax_example() {
        // 7600 * 0.0825 = 627
        let outcome = calculate_tax(
            7600,
            Some("CA".to_string()),
            &[rate("CA", "sales", 0.0825)],
            &customer(serde_json::json!({"state": "CA"})),
            now(),
        );
        assert_eq!(outcome.total_tax_cents, 627);
        assert_eq!(outcome.lines.len(), 1);
    }

    #[test]
    fn test_multiple_rates_sum_per_line_rounding() {
        let outcome = calculate_tax(
            10_000,
            Some("NY".to_string()),
            &[rate("NY", "state", 0.04), rate("NY", "city", 0.045)],
            &customer(serde_json::json!({})),
            now(),
        );
        assert_eq!(outcome.total_tax_cents, 400 + 450);
    }

    #[test]
    fn test_expired_rate_skipped() {
        let mut expired = rate("CA", "sales", 0.0825);
        expired.expiration_date = Some(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap());
        let outcome = calculate_tax(
            7600,
            Some("CA".to_string()),
            &[expired],
            &customer(serde_json::json!({})),
            now(),
        );
        assert_eq!(outcome.total_tax_cents, 0);
    }

    #[test]
    fn test_future_rate_skipped() {
        let mut future = rate("CA", "sales", 0.0825);
        future.effective_date = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let outcome = calculate_tax(
            7600,
            Some("CA".to_string()),
            &[future],
            &customer(serde_json::json!({})),
            now(),
        );
        assert_eq!(outcome.total_tax_cents, 0);
    }

    #[test]
    fn test_exempt_customer_pays_zero() {
        let outcome = calculate_tax(
            7600,
            Some("CA".to_string()),
            &[rate("CA", "sales", 0.0825)],
            &customer(serde_json::json!({"tax_exemptions": ["sales"]})),
            now(),
        );
        assert_eq!(outcome.total_tax_cents, 0);
        assert!(outcome.exempt);
    }

    #[test]
    fn test_jurisdiction_resolution_order() {
        let c = customer(serde_json::json!({"jurisdiction_code": "NY", "state": "CA"}));
        assert_eq!(resolve_jurisdiction(Some("TX"), &c).as_deref(), Some("TX"));
        assert_eq!(resolve_jurisdiction(None, &c).as_deref(), Some("NY"));

        let state_only = customer(serde_json::json!({"state": "CA"}));
        assert_eq!(resolve_jurisdiction(None, &state_only).as_deref(), Some("CA"));
    }

    #[test]
    fn test_discount_then_tax_ordering() {
        // Subtotal 10000, discounts 2400, tax 8.25% on 7600 -> 627.
        // Taxing before discounting would give round(10000*0.0825)=825
        // then 825-? ... any ordering flip changes the total; the
        // contractual order must produce 8227.
        let discounted = 7600;
        let outcome = calculate_tax(
            discounted,
            Some("CA".to_string()),
            &[rate("CA", "sales", 0.0825)],
            &customer(serde_json::json!({"state": "CA"})),
            now(),
        );
        let total = discounted + outcome.total_tax_cents;
        assert_eq!(total, 8227);

        let flipped_tax = calculate_tax(
            10_000,
            Some("CA".to_string()),
            &[rate("CA", "sales", 0.0825)],
            &customer(serde_json::json!({"state": "CA"})),
            now(),
        );
        let flipped_total = 10_000 + flipped_tax.total_tax_cents - 2400;
        assert_ne!(total, flipped_total);
    }
}
