use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
    PendingChange,
    PendingCancel,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::PendingChange => "pending_change",
            SubscriptionStatus::PendingCancel => "pending_cancel",
        }
    }

    /// Statuses that are eligible for the renewal scheduler's due scan.
    /// PendingCancel subscriptions run out at `valid_to` and must never
    /// produce a new renewal intent.
    pub fn is_renewable(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::PendingChange
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recurring entitlement to goods, billed every `billing_cycle_days` until
/// canceled. `version` increments on re-subscription after a full cancellation
/// and backs the unique `(user_id, goods_id, version)` constraint used to
/// reject concurrent starts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub goods_id: Uuid,
    pub option_id: Option<Uuid>,
    pub version: i32,
    pub billing_id: Uuid,
    pub status: SubscriptionStatus,
    /// Set when a downgrade is queued; consumed by the next successful renewal.
    pub scheduled_option_id: Option<Uuid>,
    pub billing_cycle_days: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    /// Coupons applied at creation. Immutable afterwards; renewals read it to
    /// select per-cycle discount rules but never mutate it.
    pub used_coupon_ids: Vec<Uuid>,
    /// Number of successful charges applied, including the first one.
    pub payment_count: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Availability rule: not canceled and still inside the paid-through
    /// window. Gates both re-subscription and "current subscription" queries.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.status != SubscriptionStatus::Canceled && self.valid_to > now
    }
}

/// Immutable audit entry appended on every status or option transition,
/// independent of the mutable subscription row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub trace_id: String,
    pub status: SubscriptionStatus,
    pub from_option_id: Option<Uuid>,
    pub to_option_id: Option<Uuid>,
    pub reason: String,
    pub created_at: Option<DateTime<Utc>>,
}
