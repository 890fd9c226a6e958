//! Discount stacking calculator
//!
//! Applies a set of coupons to a subtotal. One non-stackable coupon may
//! win (highest priority, then largest discount); stackable coupons are
//! applied afterwards against the running remainder in priority order.
//! The total discount never exceeds the subtotal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Coupon, CouponType};

use super::mul_ratio_round;

/// Eligibility context for a discount run
#[derive(Debug, Clone, Default)]
pub struct DiscountContext {
    /// Segment derived from customer metadata
    pub customer_segment: Option<String>,
    /// Product categories present on the invoice or charge
    pub product_categories: Vec<String>,
    /// Total quantity across line items
    pub total_quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedCoupon {
    pub coupon_id: uuid::Uuid,
    pub code: String,
    /// Subtotal the discount was computed against
    pub basis_cents: i64,
    pub discount_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedCoupon {
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountOutcome {
    pub subtotal_cents: i64,
    pub total_discount_cents: i64,
    pub final_subtotal_cents: i64,
    pub applied: Vec<AppliedCoupon>,
    pub rejected: Vec<RejectedCoupon>,
}

/// Run the discount stack against a subtotal.
pub fn apply_discounts(
    subtotal_cents: i64,
    coupons: &[Coupon],
    ctx: &DiscountContext,
    now: DateTime<Utc>,
) -> DiscountOutcome {
    let mut applied = Vec::new();
    let mut rejected = Vec::new();
    let mut eligible: Vec<&Coupon> = Vec::new();

    for coupon in coupons {
        match eligibility(coupon, ctx, now) {
            Ok(()) => eligible.push(coupon),
            Err(reason) => rejected.push(RejectedCoupon {
                code: coupon.code.clone(),
                reason,
            }),
        }
    }

    let mut remaining = subtotal_cents;

    // Single non-stackable winner: highest priority, largest discount on
    // the original subtotal as the tiebreak.
    let winner = eligible
        .iter()
        .filter(|c| !c.stackable)
        .max_by_key(|c| (c.priority, coupon_discount(c, subtotal_cents, ctx)))
        .copied();

    if let Some(winner) = winner {
        for coupon in eligible.iter().filter(|c| !c.stackable) {
            if coupon.id != winner.id {
                rejected.push(RejectedCoupon {
                    code: coupon.code.clone(),
                    reason: "non-stackable, lower priority".to_string(),
                });
            }
        }

        let discount = coupon_discount(winner, remaining, ctx).min(remaining);
        applied.push(AppliedCoupon {
            coupon_id: winner.id,
            code: winner.code.clone(),
            basis_cents: remaining,
            discount_cents: discount,
        });
        remaining -= discount;
    }

    // Stackable coupons against the running remainder, priority order.
    let mut stackable: Vec<&Coupon> = eligible.iter().filter(|c| c.stackable).copied().collect();
    stackable.sort_by(|a, b| b.priority.cmp(&a.priority));

    for coupon in stackable {
        if remaining == 0 {
            rejected.push(RejectedCoupon {
                code: coupon.code.clone(),
                reason: "subtotal already fully discounted".to_string(),
            });
            continue;
        }
        let discount = coupon_discount(coupon, remaining, ctx).min(remaining);
        applied.push(AppliedCoupon {
            coupon_id: coupon.id,
            code: coupon.code.clone(),
            basis_cents: remaining,
            discount_cents: discount,
        });
        remaining -= discount;
    }

    DiscountOutcome {
        subtotal_cents,
        total_discount_cents: subtotal_cents - remaining,
        final_subtotal_cents: remaining,
        applied,
        rejected,
    }
}

/// Discount a single coupon produces against the given basis, with the
/// per-coupon cap applied.
fn coupon_discount(coupon: &Coupon, basis_cents: i64, ctx: &DiscountContext) -> i64 {
    let raw = match coupon.coupon_type {
        CouponType::Percentage | CouponType::Contract => {
            mul_ratio_round(basis_cents, coupon.value, 100)
        }
        CouponType::Fixed | CouponType::Referral => coupon.value.min(basis_cents),
        CouponType::Volume => {
            let percent = coupon
                .tiers()
                .into_iter()
                .filter(|t| {
                    t.min <= ctx.total_quantity
                        && t.max.map_or(true, |max| ctx.total_quantity <= max)
                })
                .map(|t| t.percent)
                .max()
                .unwrap_or(0);
            mul_ratio_round(basis_cents, percent, 100)
        }
    };

    let capped = match coupon.max_discount_cents {
        Some(cap) => raw.min(cap),
        None => raw,
    };
    capped.max(0)
}

/// All gates must hold for a coupon to participate.
fn eligibility(coupon: &Coupon, ctx: &DiscountContext, now: DateTime<Utc>) -> Result<(), String> {
    if !coupon.active {
        return Err("coupon is not active".to_string());
    }

    if let Some(start) = coupon.seasonal_start {
        if now < start {
            return Err("outside seasonal window".to_string());
        }
    }
    if let Some(end) = coupon.seasonal_end {
        if now > end {
            return Err("outside seasonal window".to_string());
        }
    }

    if let Some(redeem_by) = coupon.redeem_by {
        if now > redeem_by {
            return Err("redemption period has ended".to_string());
        }
    }

    if let Some(max) = coupon.max_redemptions {
        if coupon.redemption_count >= max {
            return Err("redemption limit reached".to_string());
        }
    }

    let segments = coupon.segments();
    if !segments.is_empty() {
        match &ctx.customer_segment {
            Some(segment) if segments.iter().any(|s| s == segment) => {}
            _ => return Err("customer segment not eligible".to_string()),
        }
    }

    let categories = coupon.categories();
    if !categories.is_empty()
        && !ctx
            .product_categories
            .iter()
            .any(|c| categories.iter().any(|allowed| allowed == c))
    {
        return Err("no eligible product category".to_string());
    }

    if let Some(min_quantity) = coupon.min_quantity {
        if ctx.total_quantity < min_quantity as i64 {
            return Err(format!("minimum quantity of {} not met", min_quantity));
        }
    }

    Ok(())
}
