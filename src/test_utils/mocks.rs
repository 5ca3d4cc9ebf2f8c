//! In-memory mock implementations for the engine's repository traits.
//!
//! Each mock mirrors the storage-layer guarantees the traits document:
//! insert-or-ignore claims, conditional stock decrements and unique
//! constraint conflicts all behave as they would against Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        billing_method::BillingMethodRepo,
        ledger::TransactionRepo,
        pricing::{CouponRepo, GoodsRepo},
        subscription::{RenewalIntentRepo, SubscriptionLogRepo, SubscriptionRepo},
    },
    domain::entities::{
        billing_method::BillingMethod,
        coupon::{Coupon, CouponUsage},
        goods::{Goods, GoodsOption},
        renewal::{RenewalIntent, RenewalStatus},
        subscription::{Subscription, SubscriptionLog, SubscriptionStatus},
        transaction::{OrderStatus, Transaction},
    },
};

// ============================================================================
// InMemoryGoodsRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryGoodsRepo {
    pub goods: Mutex<HashMap<Uuid, Goods>>,
    pub options: Mutex<HashMap<Uuid, GoodsOption>>,
}

impl InMemoryGoodsRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_goods(&self, goods: Goods) {
        self.goods.lock().unwrap().insert(goods.id, goods);
    }

    pub fn add_option(&self, goods_id: Uuid, additional_price_cents: i64) -> GoodsOption {
        let option = GoodsOption {
            id: Uuid::new_v4(),
            goods_id,
            name: "option".to_string(),
            additional_price_cents,
            created_at: None,
        };
        self.options
            .lock()
            .unwrap()
            .insert(option.id, option.clone());
        option
    }
}

#[async_trait]
impl GoodsRepo for InMemoryGoodsRepo {
    async fn get(
        &self,
        goods_id: Uuid,
        option_id: Option<Uuid>,
    ) -> AppResult<(Goods, Option<GoodsOption>)> {
        let goods = self
            .goods
            .lock()
            .unwrap()
            .get(&goods_id)
            .cloned()
            .ok_or(AppError::NotFound)?;
        let option = match option_id {
            None => None,
            Some(id) => {
                let option = self
                    .options
                    .lock()
                    .unwrap()
                    .get(&id)
                    .cloned()
                    .ok_or(AppError::NotFound)?;
                if option.goods_id != goods_id {
                    return Err(AppError::NotFound);
                }
                Some(option)
            }
        };
        Ok((goods, option))
    }
}

// ============================================================================
// InMemoryCouponRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryCouponRepo {
    pub coupons: Mutex<HashMap<Uuid, Coupon>>,
    pub usages: Mutex<HashMap<Uuid, CouponUsage>>,
}

impl InMemoryCouponRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, coupon: Coupon) {
        self.coupons.lock().unwrap().insert(coupon.id, coupon);
    }
}

#[async_trait]
impl CouponRepo for InMemoryCouponRepo {
    async fn find_by_code(&self, code: &str) -> AppResult<Option<Coupon>> {
        Ok(self
            .coupons
            .lock()
            .unwrap()
            .values()
            .find(|c| c.code == code)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Coupon>> {
        Ok(self.coupons.lock().unwrap().get(&id).cloned())
    }

    async fn ensure_usage(&self, coupon_id: Uuid, initial: i64) -> AppResult<()> {
        self.usages
            .lock()
            .unwrap()
            .entry(coupon_id)
            .or_insert(CouponUsage {
                coupon_id,
                remaining: initial,
                updated_at: None,
            });
        Ok(())
    }

    async fn decrement_remaining(&self, coupon_id: Uuid) -> AppResult<bool> {
        // One lock held across check and write, matching the single
        // conditional UPDATE the real store issues.
        let mut usages = self.usages.lock().unwrap();
        match usages.get_mut(&coupon_id) {
            Some(usage) if usage.remaining > 0 => {
                usage.remaining -= 1;
                usage.updated_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_usage(&self, coupon_id: Uuid) -> AppResult<Option<CouponUsage>> {
        Ok(self.usages.lock().unwrap().get(&coupon_id).cloned())
    }
}

// ============================================================================
// InMemoryTransactionRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryTransactionRepo {
    pub transactions: Mutex<Vec<Transaction>>,
}

impl InMemoryTransactionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Transaction> {
        self.transactions.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionRepo for InMemoryTransactionRepo {
    async fn insert_or_get(&self, tx: &Transaction) -> AppResult<Transaction> {
        let mut transactions = self.transactions.lock().unwrap();
        if let Some(existing) = transactions
            .iter()
            .find(|t| t.gateway == tx.gateway && t.gateway_uid == tx.gateway_uid)
        {
            return Ok(existing.clone());
        }
        let mut tx = tx.clone();
        tx.created_at = Some(Utc::now());
        transactions.push(tx.clone());
        Ok(tx)
    }

    async fn find_by_user_and_id(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> AppResult<Option<Transaction>> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.user_id == user_id && t.id == id)
            .cloned())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: i32,
        per_page: i32,
    ) -> AppResult<(Vec<Transaction>, i64)> {
        let transactions = self.transactions.lock().unwrap();
        let matching: Vec<Transaction> = transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        let total = matching.len() as i64;
        let offset = ((page - 1) * per_page) as usize;
        let rows = matching
            .into_iter()
            .skip(offset)
            .take(per_page as usize)
            .collect();
        Ok((rows, total))
    }

    async fn has_coupon_used(&self, user_id: Uuid, coupon_id: Uuid) -> AppResult<bool> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.user_id == user_id && t.coupon_ids.contains(&coupon_id)))
    }

    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> AppResult<()> {
        let mut transactions = self.transactions.lock().unwrap();
        let tx = transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(AppError::NotFound)?;
        tx.order_status = status;
        tx.updated_at = Some(Utc::now());
        Ok(())
    }
}

// ============================================================================
// InMemoryBillingMethodRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryBillingMethodRepo {
    pub methods: Mutex<HashMap<Uuid, BillingMethod>>,
}

impl InMemoryBillingMethodRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BillingMethodRepo for InMemoryBillingMethodRepo {
    async fn find_primary_by_user(&self, user_id: Uuid) -> AppResult<Option<BillingMethod>> {
        Ok(self
            .methods
            .lock()
            .unwrap()
            .values()
            .find(|b| b.user_id == user_id && b.is_primary && !b.deleted)
            .cloned())
    }

    async fn find_by_user_and_id(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> AppResult<Option<BillingMethod>> {
        Ok(self
            .methods
            .lock()
            .unwrap()
            .get(&id)
            .filter(|b| b.user_id == user_id)
            .cloned())
    }

    async fn count_active_for_user(&self, user_id: Uuid) -> AppResult<i64> {
        Ok(self
            .methods
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.user_id == user_id && !b.deleted)
            .count() as i64)
    }

    async fn save(&self, billing: &BillingMethod) -> AppResult<()> {
        self.methods
            .lock()
            .unwrap()
            .insert(billing.id, billing.clone());
        Ok(())
    }
}

// ============================================================================
// InMemorySubscriptionRepo
// ============================================================================

#[derive(Default)]
pub struct InMemorySubscriptionRepo {
    pub subscriptions: Mutex<HashMap<Uuid, Subscription>>,
}

impl InMemorySubscriptionRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionRepo for InMemorySubscriptionRepo {
    async fn create(&self, subscription: &Subscription) -> AppResult<()> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let duplicate = subscriptions.values().any(|s| {
            s.user_id == subscription.user_id
                && s.goods_id == subscription.goods_id
                && s.version == subscription.version
        });
        if duplicate {
            return Err(AppError::Conflict(
                "subscription version already exists".into(),
            ));
        }
        let mut subscription = subscription.clone();
        subscription.created_at = Some(Utc::now());
        subscriptions.insert(subscription.id, subscription);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self.subscriptions.lock().unwrap().get(&id).cloned())
    }

    async fn latest_by_user_goods(
        &self,
        user_id: Uuid,
        goods_id: Uuid,
    ) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.user_id == user_id && s.goods_id == goods_id)
            .max_by_key(|s| s.version)
            .cloned())
    }

    async fn current_by_user_goods(
        &self,
        user_id: Uuid,
        goods_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.user_id == user_id && s.goods_id == goods_id && s.is_available(now))
            .max_by_key(|s| s.version)
            .cloned())
    }

    async fn update(&self, subscription: &Subscription) -> AppResult<()> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        if !subscriptions.contains_key(&subscription.id) {
            return Err(AppError::NotFound);
        }
        let mut subscription = subscription.clone();
        subscription.updated_at = Some(Utc::now());
        subscriptions.insert(subscription.id, subscription);
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        goods_id: Option<Uuid>,
        status: Option<SubscriptionStatus>,
        page: i32,
        per_page: i32,
    ) -> AppResult<(Vec<Subscription>, i64)> {
        let subscriptions = self.subscriptions.lock().unwrap();
        let mut matching: Vec<Subscription> = subscriptions
            .values()
            .filter(|s| s.user_id == user_id)
            .filter(|s| goods_id.is_none_or(|g| s.goods_id == g))
            .filter(|s| status.is_none_or(|st| s.status == st))
            .cloned()
            .collect();
        matching.sort_by_key(|s| (s.goods_id, std::cmp::Reverse(s.version)));
        let total = matching.len() as i64;
        let offset = ((page - 1) * per_page) as usize;
        let rows = matching
            .into_iter()
            .skip(offset)
            .take(per_page as usize)
            .collect();
        Ok((rows, total))
    }

    async fn find_due_for_renewal(
        &self,
        now: DateTime<Utc>,
        after_id: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        let subscriptions = self.subscriptions.lock().unwrap();
        let mut due: Vec<Subscription> = subscriptions
            .values()
            .filter(|s| s.status.is_renewable() && s.valid_to <= now)
            .filter(|s| after_id.is_none_or(|after| s.id > after))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.id);
        due.truncate(limit as usize);
        Ok(due)
    }
}

// ============================================================================
// InMemorySubscriptionLogRepo
// ============================================================================

#[derive(Default)]
pub struct InMemorySubscriptionLogRepo {
    pub logs: Mutex<Vec<SubscriptionLog>>,
}

impl InMemorySubscriptionLogRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionLogRepo for InMemorySubscriptionLogRepo {
    async fn append(&self, log: &SubscriptionLog) -> AppResult<()> {
        let mut log = log.clone();
        log.created_at = Some(Utc::now());
        self.logs.lock().unwrap().push(log);
        Ok(())
    }

    async fn list_for_subscription(
        &self,
        subscription_id: Uuid,
    ) -> AppResult<Vec<SubscriptionLog>> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.subscription_id == subscription_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// InMemoryRenewalIntentRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryRenewalIntentRepo {
    pub intents: Mutex<HashMap<String, RenewalIntent>>,
}

impl InMemoryRenewalIntentRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RenewalIntentRepo for InMemoryRenewalIntentRepo {
    async fn claim(&self, intent: &RenewalIntent) -> AppResult<bool> {
        let mut intents = self.intents.lock().unwrap();
        if intents.contains_key(&intent.idempotent_key) {
            return Ok(false);
        }
        let mut intent = intent.clone();
        intent.created_at = Some(Utc::now());
        intents.insert(intent.idempotent_key.clone(), intent);
        Ok(true)
    }

    async fn mark_status(&self, id: Uuid, status: RenewalStatus) -> AppResult<()> {
        let mut intents = self.intents.lock().unwrap();
        let intent = intents
            .values_mut()
            .find(|i| i.id == id)
            .ok_or(AppError::NotFound)?;
        intent.status = status;
        intent.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn find_by_key(&self, idempotent_key: &str) -> AppResult<Option<RenewalIntent>> {
        Ok(self.intents.lock().unwrap().get(idempotent_key).cloned())
    }
}
