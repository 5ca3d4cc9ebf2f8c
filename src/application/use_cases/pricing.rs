use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::ledger::TransactionRepo,
    domain::entities::{
        coupon::{Coupon, CouponUsage},
        goods::{Goods, GoodsOption},
    },
};

#[async_trait]
pub trait GoodsRepo: Send + Sync {
    /// Resolves a goods/option pair, failing with NotFound if either id is
    /// invalid or the option does not belong to the goods.
    async fn get(
        &self,
        goods_id: Uuid,
        option_id: Option<Uuid>,
    ) -> AppResult<(Goods, Option<GoodsOption>)>;
}

#[async_trait]
pub trait CouponRepo: Send + Sync {
    async fn find_by_code(&self, code: &str) -> AppResult<Option<Coupon>>;
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Coupon>>;

    /// Lazily creates the usage row with `remaining = initial` if absent.
    async fn ensure_usage(&self, coupon_id: Uuid, initial: i64) -> AppResult<()>;

    /// Single atomic conditional decrement: `remaining -= 1` only while
    /// `remaining > 0`. Returns whether the decrement happened. Never
    /// implemented as read-then-write; this is the oversell guard.
    async fn decrement_remaining(&self, coupon_id: Uuid) -> AppResult<bool>;

    async fn get_usage(&self, coupon_id: Uuid) -> AppResult<Option<CouponUsage>>;
}

/// Outcome of validating a coupon for a purchase.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum CouponValidation {
    /// One discounted amount per discount rule, in the coupon's declared
    /// order. The caller picks the rule matching the current payment count.
    Usable {
        coupon_id: Uuid,
        amounts: Vec<i64>,
    },
    SoldOut,
    AlreadyUsed,
    NotFound,
}

/// Pricing & Coupon Engine: charge amounts for goods/option pairs, coupon
/// validation, and stock-guarded redemption.
#[derive(Clone)]
pub struct PricingUseCases {
    goods_repo: Arc<dyn GoodsRepo>,
    coupon_repo: Arc<dyn CouponRepo>,
    tx_repo: Arc<dyn TransactionRepo>,
}

impl PricingUseCases {
    pub fn new(
        goods_repo: Arc<dyn GoodsRepo>,
        coupon_repo: Arc<dyn CouponRepo>,
        tx_repo: Arc<dyn TransactionRepo>,
    ) -> Self {
        Self {
            goods_repo,
            coupon_repo,
            tx_repo,
        }
    }

    pub async fn price(&self, goods_id: Uuid, option_id: Option<Uuid>) -> AppResult<i64> {
        let (goods, option) = self.goods_repo.get(goods_id, option_id).await?;
        Ok(goods.price_cents + option.map(|o| o.additional_price_cents).unwrap_or(0))
    }

    #[instrument(skip(self))]
    pub async fn validate_coupon(
        &self,
        user_id: Uuid,
        code: &str,
        goods_id: Uuid,
        option_id: Option<Uuid>,
    ) -> AppResult<CouponValidation> {
        let Some(coupon) = self.coupon_repo.find_by_code(code).await? else {
            return Ok(CouponValidation::NotFound);
        };
        self.validate(user_id, &coupon, goods_id, option_id).await
    }

    /// Same checks as `validate_coupon`, keyed by id. The subscription start
    /// path runs this before redeeming so stock and once-per-user limits are
    /// enforced on the charge path, not only at quote time.
    #[instrument(skip(self))]
    pub async fn validate_coupon_by_id(
        &self,
        user_id: Uuid,
        coupon_id: Uuid,
        goods_id: Uuid,
        option_id: Option<Uuid>,
    ) -> AppResult<CouponValidation> {
        let Some(coupon) = self.coupon_repo.find_by_id(coupon_id).await? else {
            return Ok(CouponValidation::NotFound);
        };
        self.validate(user_id, &coupon, goods_id, option_id).await
    }

    async fn validate(
        &self,
        user_id: Uuid,
        coupon: &Coupon,
        goods_id: Uuid,
        option_id: Option<Uuid>,
    ) -> AppResult<CouponValidation> {
        self.coupon_repo.ensure_usage(coupon.id, coupon.count).await?;
        let usage = self
            .coupon_repo
            .get_usage(coupon.id)
            .await?
            .ok_or_else(|| AppError::Internal("coupon usage missing after upsert".into()))?;
        if usage.remaining <= 0 {
            return Ok(CouponValidation::SoldOut);
        }

        if coupon.once_per_user && self.tx_repo.has_coupon_used(user_id, coupon.id).await? {
            return Ok(CouponValidation::AlreadyUsed);
        }

        let base = self.price(goods_id, option_id).await?;
        let amounts = coupon
            .discounts
            .iter()
            .map(|rule| coupon.apply(base, rule))
            .collect();

        Ok(CouponValidation::Usable {
            coupon_id: coupon.id,
            amounts,
        })
    }

    /// Redeems one unit of coupon stock. `false` means the stock hit zero
    /// under a concurrent redemption and the caller must treat it as SoldOut.
    pub async fn redeem(&self, coupon_id: Uuid) -> AppResult<bool> {
        let coupon = self
            .coupon_repo
            .find_by_id(coupon_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.coupon_repo.ensure_usage(coupon.id, coupon.count).await?;
        self.coupon_repo.decrement_remaining(coupon.id).await
    }

    /// Charge amount for one renewal cycle: base price for the current
    /// goods/option, with every applied coupon's rule for this payment count
    /// folded in. Coupons with no rule covering the cycle contribute nothing.
    pub async fn renewal_amount(
        &self,
        goods_id: Uuid,
        option_id: Option<Uuid>,
        used_coupon_ids: &[Uuid],
        payment_count: i32,
    ) -> AppResult<i64> {
        let mut amount = self.price(goods_id, option_id).await?;
        for coupon_id in used_coupon_ids {
            let Some(coupon) = self.coupon_repo.find_by_id(*coupon_id).await? else {
                continue;
            };
            if let Some(rule) = coupon.rule_for_cycle(payment_count) {
                amount = coupon.apply(amount, rule);
            }
        }
        Ok(amount)
    }
}
