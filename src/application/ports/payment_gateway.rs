use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::{billing_method::BillingMethod, transaction::BankTransferInfo},
};

/// Request to register a stored payment method. The raw credential (card
/// number, one-time token, ...) is opaque to the engine; the adapter exchanges
/// it for a reusable gateway token.
#[derive(Debug, Clone)]
pub struct AddBillingMethodRequest {
    pub credential: String,
}

/// A stored method as returned by the gateway adapter. `secret` is the
/// reusable off-session token; the engine encrypts it before persisting.
#[derive(Debug, Clone)]
pub struct GatewayBillingMethod {
    pub secret: String,
    pub gateway_uid: String,
    pub payload: serde_json::Value,
}

/// A charge against a stored method. `order_ref` must be stable and
/// deterministic for the logical charge (e.g. `"{subscription_id}-{payment
/// count}"`) so a retried request cannot double-charge at the gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    pub order_ref: String,
    pub amount_cents: i64,
    pub description: String,
    pub goods_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub coupon_ids: Vec<Uuid>,
}

/// Successful charge response, normalized across gateways.
#[derive(Debug, Clone)]
pub struct GatewayCharge {
    /// Gateway-unique id; the ledger's idempotency boundary.
    pub gateway_uid: String,
    pub amount_cents: i64,
    pub payload: serde_json::Value,
    pub bank_transfer: Option<BankTransferInfo>,
}

/// Contract a gateway adapter must fulfil. Wire protocols, signatures and
/// card-data encryption live entirely inside implementations.
#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    /// Gateway name the router dispatches on; stored on billing methods.
    fn name(&self) -> &'static str;

    async fn add_billing_method(
        &self,
        user_id: Uuid,
        trace_id: &str,
        request: &AddBillingMethodRequest,
    ) -> AppResult<GatewayBillingMethod>;

    async fn remove_billing_method(
        &self,
        user_id: Uuid,
        trace_id: &str,
        billing: &BillingMethod,
    ) -> AppResult<()>;

    async fn charge_stored_method(
        &self,
        user_id: Uuid,
        trace_id: &str,
        billing: &BillingMethod,
        request: &ChargeRequest,
    ) -> AppResult<GatewayCharge>;

    /// Best-effort net-cancel for an order whose outcome is unknown (e.g. a
    /// timeout after submission). Invoked eagerly to avoid stranded
    /// authorizations; failures are logged, never propagated.
    async fn reverse_charge(&self, trace_id: &str, order_ref: &str) -> AppResult<()>;
}
