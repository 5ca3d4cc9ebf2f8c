use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A tokenized, stored payment credential usable for unattended charges.
/// The gateway credential token is encrypted at rest and cleared on deletion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingMethod {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Gateway name the router dispatches on.
    pub gateway: String,
    #[serde(skip_serializing)]
    pub secret_encrypted: Option<String>,
    pub deleted: bool,
    /// Renewals always resolve through the designated primary method.
    pub is_primary: bool,
    /// The ledger transaction recorded when this method was registered.
    pub transaction_id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
