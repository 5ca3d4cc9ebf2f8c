use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "renewal_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RenewalStatus {
    Pending,
    Paid,
    Failed,
}

impl RenewalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenewalStatus::Pending => "pending",
            RenewalStatus::Paid => "paid",
            RenewalStatus::Failed => "failed",
        }
    }
}

/// Idempotency-guarded record of "subscription X is due for its Nth renewal
/// charge". The key is globally unique; only the caller that wins the
/// insert-or-ignore race proceeds to charge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalIntent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub idempotent_key: String,
    /// The payment count this renewal will bring the subscription to.
    pub payment_count: i32,
    pub status: RenewalStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RenewalIntent {
    pub fn idempotent_key_for(subscription_id: Uuid, payment_count: i32) -> String {
        format!("{}-{}", subscription_id, payment_count)
    }

    pub fn new(user_id: Uuid, subscription_id: Uuid, payment_count: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            subscription_id,
            idempotent_key: Self::idempotent_key_for(subscription_id, payment_count),
            payment_count,
            status: RenewalStatus::Pending,
            created_at: None,
            updated_at: None,
        }
    }
}
