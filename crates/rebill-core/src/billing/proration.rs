//! Proration calculator
//!
//! Day-granular split of a billing period at a change date. Dates are
//! normalized to UTC midnight before the day counts are taken, so two
//! change events on the same calendar day prorate identically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::mul_ratio_round;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProrationInput {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub change_date: DateTime<Utc>,
    pub old_price_cents: i64,
    pub new_price_cents: i64,
    /// Seat multiplier applied to both prices; 1 for plain plan changes
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProrationKind {
    ProrationCharge,
    ProrationCredit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProrationResult {
    pub days_total: i64,
    pub days_remaining: i64,
    /// Credit for the unused remainder of the old price
    pub credit_cents: i64,
    /// Charge for the remainder of the period at the new price
    pub charge_cents: i64,
    /// charge - credit; positive nets a charge, negative a credit
    pub net_cents: i64,
    pub kind: ProrationKind,
}

/// Prorate a plan change inside a billing period.
///
/// `days_remaining` is clamped to `[0, days_total]`: a change at or before
/// period start credits/charges the full period, a change at or after
/// period end nets zero. A degenerate zero-day period also nets zero.
pub fn prorate(input: &ProrationInput) -> ProrationResult {
    let start = midnight(input.period_start);
    let end = midnight(input.period_end);
    let change = midnight(input.change_date);

    let days_total = (end - start).num_days().max(0);
    let days_remaining = (end - change).num_days().clamp(0, days_total);

    let old_price = input.old_price_cents * input.quantity.max(1);
    let new_price = input.new_price_cents * input.quantity.max(1);

    let (credit_cents, charge_cents) = if days_total == 0 {
        (0, 0)
    } else {
        (
            mul_ratio_round(old_price, days_remaining, days_total),
            mul_ratio_round(new_price, days_remaining, days_total),
        )
    };

    let net_cents = charge_cents - credit_cents;
    let kind = if net_cents >= 0 {
        ProrationKind::ProrationCharge
    } else {
        ProrationKind::ProrationCredit
    };

    ProrationResult {
        days_total,
        days_remaining,
        credit_cents,
        charge_cents,
        net_cents,
        kind,
    }
}

fn midnight(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
}
