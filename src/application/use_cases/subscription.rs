use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::payment_gateway::ChargeRequest,
        use_cases::{
            billing_method::BillingMethodRepo,
            gateway_router::GatewayRouter,
            ledger::LedgerUseCases,
            pricing::{CouponValidation, PricingUseCases},
        },
    },
    domain::entities::{
        billing_method::BillingMethod,
        renewal::{RenewalIntent, RenewalStatus},
        subscription::{Subscription, SubscriptionLog, SubscriptionStatus},
        transaction::{NewTransaction, OrderStatus, Transaction, TransactionType},
    },
};

#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    /// Persists a new subscription. The `(user_id, goods_id, version)` unique
    /// constraint makes concurrent starts fail fast; the implementation maps
    /// that violation to `AppError::Conflict`.
    async fn create(&self, subscription: &Subscription) -> AppResult<()>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>>;

    /// Highest-version subscription for a user+goods pair, regardless of
    /// status. Re-subscription versioning is derived from this row.
    async fn latest_by_user_goods(
        &self,
        user_id: Uuid,
        goods_id: Uuid,
    ) -> AppResult<Option<Subscription>>;

    /// The user's available subscription for a goods id, if any. Canceled or
    /// expired rows are never returned.
    async fn current_by_user_goods(
        &self,
        user_id: Uuid,
        goods_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Subscription>>;

    async fn update(&self, subscription: &Subscription) -> AppResult<()>;

    async fn list_for_user(
        &self,
        user_id: Uuid,
        goods_id: Option<Uuid>,
        status: Option<SubscriptionStatus>,
        page: i32,
        per_page: i32,
    ) -> AppResult<(Vec<Subscription>, i64)>;

    /// Keyset batch of subscriptions whose `valid_to` has passed and whose
    /// status permits renewal, ordered by id. The scheduler walks this in
    /// pages so the full due-set is never held in memory.
    async fn find_due_for_renewal(
        &self,
        now: DateTime<Utc>,
        after_id: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>>;
}

#[async_trait]
pub trait SubscriptionLogRepo: Send + Sync {
    async fn append(&self, log: &SubscriptionLog) -> AppResult<()>;
    async fn list_for_subscription(
        &self,
        subscription_id: Uuid,
    ) -> AppResult<Vec<SubscriptionLog>>;
}

#[async_trait]
pub trait RenewalIntentRepo: Send + Sync {
    /// Insert-or-ignore on the globally unique `idempotent_key`. Returns
    /// whether this caller won the claim; losers must skip, not retry.
    async fn claim(&self, intent: &RenewalIntent) -> AppResult<bool>;

    async fn mark_status(&self, id: Uuid, status: RenewalStatus) -> AppResult<()>;

    async fn find_by_key(&self, idempotent_key: &str) -> AppResult<Option<RenewalIntent>>;
}

/// What a failed renewal charge does to the subscription row. Surfaced as
/// configuration because dunning policy is a product decision, not an engine
/// invariant.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum RenewalFailurePolicy {
    /// Demote to PastDue so reconciliation tooling can find it.
    #[default]
    MarkPastDue,
    /// Leave the status untouched; the next scheduler tick re-evaluates.
    KeepActive,
}

/// Lifecycle operations validated against the state-transition table before
/// any mutation happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOp {
    Upgrade,
    Downgrade,
    Cancel,
    CancelPendingChange,
    ApplyRenewal,
    MarkPastDue,
}

/// Explicit `(current state, operation) -> new state` table. Anything not
/// listed is a conflict.
pub fn transition(
    current: SubscriptionStatus,
    op: LifecycleOp,
) -> AppResult<SubscriptionStatus> {
    use LifecycleOp::*;
    use SubscriptionStatus::*;

    let next = match (current, op) {
        (Active | PendingChange | PendingCancel, Upgrade) => Active,
        (Active | PendingChange, Downgrade) => PendingChange,
        (Active | PendingChange, Cancel) => PendingCancel,
        (PendingChange | PendingCancel, CancelPendingChange) => Active,
        (Active | PendingChange, ApplyRenewal) => Active,
        (Active | PendingChange, MarkPastDue) => PastDue,
        (state, op) => {
            return Err(AppError::Conflict(format!(
                "operation {:?} not allowed in state {}",
                op, state
            )));
        }
    };
    Ok(next)
}

#[derive(Debug, Clone)]
pub struct StartSubscriptionInput {
    pub user_id: Uuid,
    pub goods_id: Uuid,
    pub option_id: Option<Uuid>,
    pub coupon_id: Option<Uuid>,
    /// Amount for the initial charge, already discounted by the caller via
    /// the pricing engine.
    pub first_amount_cents: i64,
    pub billing_cycle_days: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedSubscriptions {
    pub subscriptions: Vec<Subscription>,
    pub total: i64,
    pub page: i32,
    pub per_page: i32,
    pub total_pages: i32,
}

/// Subscription Lifecycle Service: owns the state machine and every charge
/// made on behalf of a subscription.
pub struct SubscriptionUseCases {
    subscription_repo: Arc<dyn SubscriptionRepo>,
    log_repo: Arc<dyn SubscriptionLogRepo>,
    intent_repo: Arc<dyn RenewalIntentRepo>,
    billing_repo: Arc<dyn BillingMethodRepo>,
    pricing: Arc<PricingUseCases>,
    ledger: Arc<LedgerUseCases>,
    router: Arc<GatewayRouter>,
    failure_policy: RenewalFailurePolicy,
}

impl SubscriptionUseCases {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepo>,
        log_repo: Arc<dyn SubscriptionLogRepo>,
        intent_repo: Arc<dyn RenewalIntentRepo>,
        billing_repo: Arc<dyn BillingMethodRepo>,
        pricing: Arc<PricingUseCases>,
        ledger: Arc<LedgerUseCases>,
        router: Arc<GatewayRouter>,
        failure_policy: RenewalFailurePolicy,
    ) -> Self {
        Self {
            subscription_repo,
            log_repo,
            intent_repo,
            billing_repo,
            pricing,
            ledger,
            router,
            failure_policy,
        }
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id, goods_id = %input.goods_id))]
    pub async fn start(&self, input: StartSubscriptionInput) -> AppResult<Subscription> {
        let now = Utc::now();
        if input.billing_cycle_days <= 0 {
            return Err(AppError::InvalidInput(
                "billing cycle must be at least one day".into(),
            ));
        }

        let latest = self
            .subscription_repo
            .latest_by_user_goods(input.user_id, input.goods_id)
            .await?;
        if let Some(prev) = &latest {
            if prev.is_available(now) {
                return Err(AppError::Conflict(
                    "an available subscription already exists; request an upgrade or downgrade instead"
                        .into(),
                ));
            }
        }

        // Validates both ids before anything is persisted.
        self.pricing.price(input.goods_id, input.option_id).await?;
        let billing = self
            .billing_repo
            .find_primary_by_user(input.user_id)
            .await?
            .ok_or(AppError::NotFound)?;

        // Full coupon validation on the charge path, not just a stock check:
        // a once-per-user coupon must be rejected here even if the caller
        // skipped the quote step.
        if let Some(coupon_id) = input.coupon_id {
            match self
                .pricing
                .validate_coupon_by_id(input.user_id, coupon_id, input.goods_id, input.option_id)
                .await?
            {
                CouponValidation::Usable { .. } => {}
                CouponValidation::SoldOut => {
                    return Err(AppError::Conflict("coupon is sold out".into()));
                }
                CouponValidation::AlreadyUsed => {
                    return Err(AppError::Conflict(
                        "coupon was already used by this user".into(),
                    ));
                }
                CouponValidation::NotFound => return Err(AppError::NotFound),
            }
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            goods_id: input.goods_id,
            option_id: input.option_id,
            version: latest.map(|p| p.version + 1).unwrap_or(1),
            billing_id: billing.id,
            status: SubscriptionStatus::Active,
            scheduled_option_id: None,
            billing_cycle_days: input.billing_cycle_days,
            valid_from: now,
            valid_to: now + Duration::days(input.billing_cycle_days),
            used_coupon_ids: input.coupon_id.into_iter().collect(),
            payment_count: 0,
            created_at: None,
            updated_at: None,
        };
        self.subscription_repo.create(&subscription).await?;

        // Stock is consumed only once the row exists; a losing concurrent
        // start fails on the version constraint above without burning a unit.
        if let Some(coupon_id) = input.coupon_id {
            if !self.pricing.redeem(coupon_id).await? {
                warn!(
                    subscription_id = %subscription.id,
                    coupon_id = %coupon_id,
                    "coupon stock ran out between validation and redemption"
                );
                return Err(AppError::Conflict("coupon is sold out".into()));
            }
        }

        let trace_id = Uuid::new_v4().to_string();
        self.append_log(
            &subscription,
            &trace_id,
            None,
            subscription.option_id,
            "subscription started",
        )
        .await?;

        // The initial charge carries payment count 0; renewals start at 1.
        let request = ChargeRequest {
            order_ref: format!("{}-0", subscription.id),
            amount_cents: input.first_amount_cents,
            description: "subscription first charge".into(),
            goods_id: Some(subscription.goods_id),
            subscription_id: Some(subscription.id),
            coupon_ids: subscription.used_coupon_ids.clone(),
        };
        if let Err(e) = self
            .charge_and_record(subscription.user_id, &trace_id, &billing, &request)
            .await
        {
            // The row is already persisted; a failed first charge leaves it
            // unpaid and needs manual reconciliation.
            warn!(
                subscription_id = %subscription.id,
                error = %e,
                "first charge failed after subscription row was persisted"
            );
            return Err(e);
        }

        Ok(subscription)
    }

    /// Immediate option change: takes effect now and resets the period.
    #[instrument(skip(self))]
    pub async fn upgrade(
        &self,
        user_id: Uuid,
        subscription_id: Uuid,
        new_option_id: Uuid,
    ) -> AppResult<Subscription> {
        let now = Utc::now();
        let mut subscription = self.load_owned(user_id, subscription_id).await?;
        if !subscription.is_available(now) {
            return Err(AppError::Conflict("subscription is not available".into()));
        }
        let next = transition(subscription.status, LifecycleOp::Upgrade)?;
        self.pricing
            .price(subscription.goods_id, Some(new_option_id))
            .await?;

        let from = subscription.option_id;
        subscription.option_id = Some(new_option_id);
        subscription.scheduled_option_id = None;
        subscription.status = next;
        subscription.valid_to = now + Duration::days(subscription.billing_cycle_days);
        self.subscription_repo.update(&subscription).await?;

        let trace_id = Uuid::new_v4().to_string();
        self.append_log(
            &subscription,
            &trace_id,
            from,
            Some(new_option_id),
            "upgrade applied",
        )
        .await?;
        Ok(subscription)
    }

    /// Deferred option change: queued on the row, applied by the next
    /// successful renewal.
    #[instrument(skip(self))]
    pub async fn downgrade(
        &self,
        user_id: Uuid,
        subscription_id: Uuid,
        new_option_id: Uuid,
    ) -> AppResult<Subscription> {
        let now = Utc::now();
        let mut subscription = self.load_owned(user_id, subscription_id).await?;
        if !subscription.is_available(now) {
            return Err(AppError::Conflict("subscription is not available".into()));
        }
        let next = transition(subscription.status, LifecycleOp::Downgrade)?;
        self.pricing
            .price(subscription.goods_id, Some(new_option_id))
            .await?;

        subscription.scheduled_option_id = Some(new_option_id);
        subscription.status = next;
        self.subscription_repo.update(&subscription).await?;

        let trace_id = Uuid::new_v4().to_string();
        self.append_log(
            &subscription,
            &trace_id,
            subscription.option_id,
            Some(new_option_id),
            "downgrade scheduled for next cycle",
        )
        .await?;
        Ok(subscription)
    }

    /// Schedules cancellation for the end of the current period. The
    /// subscription stays usable until `valid_to` and is never renewed again.
    #[instrument(skip(self))]
    pub async fn cancel(&self, user_id: Uuid, subscription_id: Uuid) -> AppResult<Subscription> {
        let now = Utc::now();
        let mut subscription = self.load_owned(user_id, subscription_id).await?;
        if !subscription.is_available(now) {
            return Err(AppError::Conflict("subscription is not available".into()));
        }
        subscription.status = transition(subscription.status, LifecycleOp::Cancel)?;
        self.subscription_repo.update(&subscription).await?;

        let trace_id = Uuid::new_v4().to_string();
        self.append_log(
            &subscription,
            &trace_id,
            subscription.option_id,
            subscription.option_id,
            "cancellation scheduled for period end",
        )
        .await?;
        Ok(subscription)
    }

    /// Reverts a pending change or pending cancellation back to Active.
    #[instrument(skip(self))]
    pub async fn cancel_pending_change(
        &self,
        user_id: Uuid,
        subscription_id: Uuid,
    ) -> AppResult<Subscription> {
        let mut subscription = self.load_owned(user_id, subscription_id).await?;
        subscription.status = transition(subscription.status, LifecycleOp::CancelPendingChange)?;
        let scheduled = subscription.scheduled_option_id.take();
        self.subscription_repo.update(&subscription).await?;

        let trace_id = Uuid::new_v4().to_string();
        self.append_log(
            &subscription,
            &trace_id,
            scheduled,
            subscription.option_id,
            "pending change reverted",
        )
        .await?;
        Ok(subscription)
    }

    /// Applies one claimed renewal intent: recompute the cycle amount, charge
    /// the primary billing method, then either extend the validity window and
    /// mark the intent paid, or mark it failed and apply the configured
    /// failure policy. `valid_to` and `payment_count` never move on failure.
    #[instrument(skip(self, intent), fields(idempotent_key = %intent.idempotent_key))]
    pub async fn renew(&self, intent: &RenewalIntent) -> AppResult<Subscription> {
        let Some(mut subscription) = self
            .subscription_repo
            .find_by_id(intent.subscription_id)
            .await?
        else {
            self.intent_repo
                .mark_status(intent.id, RenewalStatus::Failed)
                .await?;
            return Err(AppError::NotFound);
        };

        let amount = self
            .pricing
            .renewal_amount(
                subscription.goods_id,
                subscription.option_id,
                &subscription.used_coupon_ids,
                intent.payment_count,
            )
            .await?;

        let billing = match self
            .billing_repo
            .find_primary_by_user(subscription.user_id)
            .await?
        {
            Some(b) => b,
            None => {
                self.intent_repo
                    .mark_status(intent.id, RenewalStatus::Failed)
                    .await?;
                return Err(AppError::NotFound);
            }
        };

        let trace_id = Uuid::new_v4().to_string();
        let request = ChargeRequest {
            // The idempotent key doubles as the gateway order reference, so a
            // retried charge for the same cycle is deduplicated gateway-side.
            order_ref: intent.idempotent_key.clone(),
            amount_cents: amount,
            description: "subscription renewal".into(),
            goods_id: Some(subscription.goods_id),
            subscription_id: Some(subscription.id),
            coupon_ids: subscription.used_coupon_ids.clone(),
        };

        match self
            .charge_and_record(subscription.user_id, &trace_id, &billing, &request)
            .await
        {
            Ok(_) => {
                subscription.payment_count = intent.payment_count;
                subscription.valid_to += Duration::days(subscription.billing_cycle_days);

                let scheduled = subscription.scheduled_option_id.take();
                let status_before = subscription.status;
                if status_before == SubscriptionStatus::PendingChange {
                    subscription.status =
                        transition(status_before, LifecycleOp::ApplyRenewal)?;
                }
                if let Some(next_option) = scheduled {
                    let from = subscription.option_id;
                    subscription.option_id = Some(next_option);
                    self.append_log(
                        &subscription,
                        &trace_id,
                        from,
                        Some(next_option),
                        "scheduled downgrade applied on renewal",
                    )
                    .await?;
                } else if subscription.status != status_before {
                    self.append_log(
                        &subscription,
                        &trace_id,
                        subscription.option_id,
                        subscription.option_id,
                        "pending change resolved on renewal",
                    )
                    .await?;
                }

                self.subscription_repo.update(&subscription).await?;
                self.intent_repo
                    .mark_status(intent.id, RenewalStatus::Paid)
                    .await?;
                Ok(subscription)
            }
            Err(e) => {
                self.intent_repo
                    .mark_status(intent.id, RenewalStatus::Failed)
                    .await?;
                if self.failure_policy == RenewalFailurePolicy::MarkPastDue {
                    if let Ok(next) = transition(subscription.status, LifecycleOp::MarkPastDue) {
                        subscription.status = next;
                        self.subscription_repo.update(&subscription).await?;
                        self.append_log(
                            &subscription,
                            &trace_id,
                            subscription.option_id,
                            subscription.option_id,
                            "renewal charge failed",
                        )
                        .await?;
                    }
                }
                Err(e)
            }
        }
    }

    /// The user's available subscription for a goods id. Canceled rows are
    /// never returned, regardless of their validity window.
    pub async fn current(&self, user_id: Uuid, goods_id: Uuid) -> AppResult<Option<Subscription>> {
        self.subscription_repo
            .current_by_user_goods(user_id, goods_id, Utc::now())
            .await
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        goods_id: Option<Uuid>,
        status: Option<SubscriptionStatus>,
        page: i32,
        per_page: i32,
    ) -> AppResult<PaginatedSubscriptions> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let (subscriptions, total) = self
            .subscription_repo
            .list_for_user(user_id, goods_id, status, page, per_page)
            .await?;
        let total_pages = ((total as f64) / (per_page as f64)).ceil() as i32;
        Ok(PaginatedSubscriptions {
            subscriptions,
            total,
            page,
            per_page,
            total_pages,
        })
    }

    async fn load_owned(&self, user_id: Uuid, subscription_id: Uuid) -> AppResult<Subscription> {
        let subscription = self
            .subscription_repo
            .find_by_id(subscription_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if subscription.user_id != user_id {
            return Err(AppError::NotFound);
        }
        Ok(subscription)
    }

    /// Routes a charge to the gateway and records the attempt in the ledger
    /// whatever the outcome. An unknown-outcome failure triggers an eager
    /// best-effort reversal so no authorization is left stranded.
    async fn charge_and_record(
        &self,
        user_id: Uuid,
        trace_id: &str,
        billing: &BillingMethod,
        request: &ChargeRequest,
    ) -> AppResult<Transaction> {
        let adapter = self.router.resolve_for(billing)?;
        match adapter
            .charge_stored_method(user_id, trace_id, billing, request)
            .await
        {
            Ok(charge) => {
                self.ledger
                    .record(NewTransaction {
                        id: None,
                        user_id,
                        trace_id: trace_id.to_string(),
                        tx_type: TransactionType::Order,
                        gateway: billing.gateway.clone(),
                        gateway_uid: charge.gateway_uid,
                        gateway_payload: charge.payload,
                        goods_id: request.goods_id,
                        subscription_id: request.subscription_id,
                        coupon_ids: request.coupon_ids.clone(),
                        amount_cents: charge.amount_cents,
                        order_status: OrderStatus::Paid,
                        message: "charge approved".into(),
                        bank_transfer: charge.bank_transfer,
                    })
                    .await
            }
            Err(e) => {
                if matches!(e, AppError::GatewayUnavailable(_)) {
                    if let Err(reverse_err) =
                        adapter.reverse_charge(trace_id, &request.order_ref).await
                    {
                        warn!(
                            order_ref = %request.order_ref,
                            error = %reverse_err,
                            "reversal after unknown-outcome charge failed"
                        );
                    }
                }
                self.ledger
                    .record(NewTransaction {
                        id: None,
                        user_id,
                        trace_id: trace_id.to_string(),
                        tx_type: TransactionType::Order,
                        gateway: billing.gateway.clone(),
                        // Unique per attempt; a later successful charge keeps
                        // its own gateway-issued uid.
                        gateway_uid: format!("fail-{}", trace_id),
                        gateway_payload: serde_json::json!({}),
                        goods_id: request.goods_id,
                        subscription_id: request.subscription_id,
                        coupon_ids: request.coupon_ids.clone(),
                        amount_cents: request.amount_cents,
                        order_status: OrderStatus::Failed,
                        message: e.to_string(),
                        bank_transfer: None,
                    })
                    .await?;
                Err(e)
            }
        }
    }

    async fn append_log(
        &self,
        subscription: &Subscription,
        trace_id: &str,
        from_option_id: Option<Uuid>,
        to_option_id: Option<Uuid>,
        reason: &str,
    ) -> AppResult<()> {
        self.log_repo
            .append(&SubscriptionLog {
                id: Uuid::new_v4(),
                user_id: subscription.user_id,
                subscription_id: subscription.id,
                trace_id: trace_id.to_string(),
                status: subscription.status,
                from_option_id,
                to_option_id,
                reason: reason.to_string(),
                created_at: None,
            })
            .await
    }
}
