use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    BillingAddCard,
    BillingRemoveCard,
    BillingTest,
    Order,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::BillingAddCard => "billing_add_card",
            TransactionType::BillingRemoveCard => "billing_remove_card",
            TransactionType::BillingTest => "billing_test",
            TransactionType::Order => "order",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Canceled => "canceled",
        }
    }
}

/// Optional bank-transfer (virtual account) metadata attached to a charge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankTransferInfo {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Append-only audit row for every attempted charge, success or failure.
/// `(gateway, gateway_uid)` is unique and forms the idempotency boundary
/// against duplicate gateway events.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub trace_id: String,
    pub tx_type: TransactionType,
    pub gateway: String,
    pub gateway_uid: String,
    /// Opaque gateway response payload, kept verbatim for reconciliation.
    pub gateway_payload: serde_json::Value,
    pub goods_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub coupon_ids: Vec<Uuid>,
    pub amount_cents: i64,
    pub order_status: OrderStatus,
    pub message: String,
    pub bank_transfer: Option<BankTransferInfo>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for recording a transaction. `id` may be caller-supplied for
/// idempotent creation; a fresh one is assigned otherwise.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub id: Option<Uuid>,
    pub user_id: Uuid,
    pub trace_id: String,
    pub tx_type: TransactionType,
    pub gateway: String,
    pub gateway_uid: String,
    pub gateway_payload: serde_json::Value,
    pub goods_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub coupon_ids: Vec<Uuid>,
    pub amount_cents: i64,
    pub order_status: OrderStatus,
    pub message: String,
    pub bank_transfer: Option<BankTransferInfo>,
}
