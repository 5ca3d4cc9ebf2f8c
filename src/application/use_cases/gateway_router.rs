use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::PaymentGatewayPort,
    domain::entities::billing_method::BillingMethod,
};

/// PG Router: dispatches to the gateway adapter registered for a stored
/// payment method's gateway name.
pub struct GatewayRouter {
    adapters: HashMap<&'static str, Arc<dyn PaymentGatewayPort>>,
}

impl GatewayRouter {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(mut self, adapter: Arc<dyn PaymentGatewayPort>) -> Self {
        self.adapters.insert(adapter.name(), adapter);
        self
    }

    pub fn resolve(&self, gateway: &str) -> AppResult<Arc<dyn PaymentGatewayPort>> {
        self.adapters.get(gateway).cloned().ok_or_else(|| {
            AppError::Internal(format!("no gateway adapter registered for '{}'", gateway))
        })
    }

    pub fn resolve_for(&self, billing: &BillingMethod) -> AppResult<Arc<dyn PaymentGatewayPort>> {
        self.resolve(&billing.gateway)
    }
}

impl Default for GatewayRouter {
    fn default() -> Self {
        Self::new()
    }
}
