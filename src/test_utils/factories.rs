//! Test data factories for creating valid fixtures.
//!
//! Each factory creates a complete, valid object with sensible defaults and
//! registers it with the given in-memory repository. Use the closure
//! parameter to override specific fields as needed.

use uuid::Uuid;

use crate::domain::entities::{
    billing_method::BillingMethod,
    coupon::{Coupon, CouponType, DiscountRule},
    goods::{Goods, GoodsOption},
};
use crate::test_utils::mocks::{InMemoryBillingMethodRepo, InMemoryCouponRepo, InMemoryGoodsRepo};

/// Create a goods row, optionally with one option carrying a surcharge.
pub fn create_test_goods(
    repo: &InMemoryGoodsRepo,
    price_cents: i64,
    additional_price_cents: Option<i64>,
) -> (Goods, Option<GoodsOption>) {
    let goods = Goods {
        id: Uuid::new_v4(),
        name: "Monthly Plan".to_string(),
        price_cents,
        created_at: None,
    };
    repo.add_goods(goods.clone());
    let option = additional_price_cents.map(|cents| repo.add_option(goods.id, cents));
    (goods, option)
}

/// Create a coupon with sensible defaults: 10% off every cycle, stock of 10,
/// reusable across users.
pub fn create_test_coupon(
    repo: &InMemoryCouponRepo,
    overrides: impl FnOnce(&mut Coupon),
) -> Coupon {
    let mut coupon = Coupon {
        id: Uuid::new_v4(),
        code: format!("TEST-{}", Uuid::new_v4()),
        coupon_type: CouponType::Percentage,
        count: 10,
        once_per_user: false,
        discounts: vec![DiscountRule {
            period: 0,
            value: 10,
        }],
        created_at: None,
    };
    overrides(&mut coupon);
    repo.add(coupon.clone());
    coupon
}

/// Create an active primary billing method for the user.
pub fn create_test_billing_method(
    repo: &InMemoryBillingMethodRepo,
    user_id: Uuid,
    overrides: impl FnOnce(&mut BillingMethod),
) -> BillingMethod {
    let mut billing = BillingMethod {
        id: Uuid::new_v4(),
        user_id,
        gateway: "dummy".to_string(),
        secret_encrypted: Some("encrypted-token".to_string()),
        deleted: false,
        is_primary: true,
        transaction_id: None,
        created_at: None,
        updated_at: None,
    };
    overrides(&mut billing);
    repo.methods
        .lock()
        .unwrap()
        .insert(billing.id, billing.clone());
    billing
}
