use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        AddBillingMethodRequest, ChargeRequest, GatewayBillingMethod, GatewayCharge,
        PaymentGatewayPort,
    },
    domain::entities::billing_method::BillingMethod,
};

/// Outcome the dummy gateway should produce for a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeScenario {
    Success,
    Decline,
    /// Request submitted, outcome unknown. Callers are expected to issue a
    /// reversal for the order reference.
    Unavailable,
}

/// Dummy gateway adapter: simulates all gateway operations locally, no
/// external calls. Charges succeed unless a failure scenario was queued, and
/// reversals are recorded so tests can assert on them.
pub struct DummyGateway {
    scripted: Mutex<VecDeque<ChargeScenario>>,
    reversals: Mutex<Vec<String>>,
}

impl DummyGateway {
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            reversals: Mutex::new(Vec::new()),
        }
    }

    /// Queues an outcome for the next charge; consumed in FIFO order.
    pub fn fail_next_charge(&self, scenario: ChargeScenario) {
        self.scripted.lock().unwrap().push_back(scenario);
    }

    /// Order references that were reversed, in call order.
    pub fn reversed(&self) -> Vec<String> {
        self.reversals.lock().unwrap().clone()
    }

    fn next_scenario(&self) -> ChargeScenario {
        self.scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ChargeScenario::Success)
    }
}

impl Default for DummyGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGatewayPort for DummyGateway {
    fn name(&self) -> &'static str {
        "dummy"
    }

    async fn add_billing_method(
        &self,
        user_id: Uuid,
        trace_id: &str,
        request: &AddBillingMethodRequest,
    ) -> AppResult<GatewayBillingMethod> {
        debug!(%user_id, trace_id, "dummy: registering billing method");
        Ok(GatewayBillingMethod {
            secret: format!("dummy_tok_{}", Uuid::new_v4()),
            gateway_uid: format!("dummy_bill_{}", Uuid::new_v4()),
            payload: serde_json::json!({
                "gateway": "dummy",
                "credentialLen": request.credential.len(),
            }),
        })
    }

    async fn remove_billing_method(
        &self,
        user_id: Uuid,
        trace_id: &str,
        billing: &BillingMethod,
    ) -> AppResult<()> {
        debug!(%user_id, trace_id, billing_id = %billing.id, "dummy: removing billing method");
        Ok(())
    }

    async fn charge_stored_method(
        &self,
        user_id: Uuid,
        trace_id: &str,
        _billing: &BillingMethod,
        request: &ChargeRequest,
    ) -> AppResult<GatewayCharge> {
        debug!(
            %user_id,
            trace_id,
            order_ref = %request.order_ref,
            amount_cents = request.amount_cents,
            "dummy: charging stored method"
        );
        match self.next_scenario() {
            ChargeScenario::Success => Ok(GatewayCharge {
                gateway_uid: format!("dummy_ch_{}", Uuid::new_v4()),
                amount_cents: request.amount_cents,
                payload: serde_json::json!({
                    "orderRef": request.order_ref,
                    "approved": true,
                }),
                bank_transfer: None,
            }),
            ChargeScenario::Decline => {
                Err(AppError::GatewayDeclined("Your card was declined.".into()))
            }
            ChargeScenario::Unavailable => Err(AppError::GatewayUnavailable(
                "gateway did not respond before the deadline".into(),
            )),
        }
    }

    async fn reverse_charge(&self, trace_id: &str, order_ref: &str) -> AppResult<()> {
        debug!(trace_id, order_ref, "dummy: reversing charge");
        self.reversals.lock().unwrap().push(order_ref.to_string());
        Ok(())
    }
}
