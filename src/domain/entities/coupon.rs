use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "coupon_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CouponType {
    /// Subtracts a fixed amount of cents from the price.
    Amount,
    /// Multiplies the price by `(100 - value) / 100`.
    Percentage,
}

/// One entry in a coupon's discount schedule. `period = 0` applies on every
/// cycle; otherwise the rule covers payment counts strictly below `period`,
/// letting a coupon taper off across successive billing periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountRule {
    pub period: i32,
    pub value: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub coupon_type: CouponType,
    /// Initial stock; seeds the usage counter on first redemption.
    pub count: i64,
    pub once_per_user: bool,
    pub discounts: Vec<DiscountRule>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Coupon {
    /// Applies one discount rule to a price. Results are clamped at zero so a
    /// large fixed-amount coupon on a cheap item never produces a negative
    /// charge.
    pub fn apply(&self, price_cents: i64, rule: &DiscountRule) -> i64 {
        let discounted = match self.coupon_type {
            CouponType::Amount => price_cents - rule.value,
            CouponType::Percentage => price_cents * (100 - rule.value) / 100,
        };
        discounted.max(0)
    }

    /// Selects the discount rule covering the given payment count. First
    /// applicable rule in declared order wins; `None` means full price.
    pub fn rule_for_cycle(&self, payment_count: i32) -> Option<&DiscountRule> {
        self.discounts
            .iter()
            .find(|r| r.period == 0 || payment_count < r.period)
    }
}

/// The mutable stock counter for a coupon code, lazily created on first
/// redemption attempt. `remaining` never drops below zero; the decrement is a
/// single conditional write at the storage layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponUsage {
    pub coupon_id: Uuid,
    pub remaining: i64,
    pub updated_at: Option<DateTime<Utc>>,
}
