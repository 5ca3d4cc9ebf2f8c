pub mod billing_method;
pub mod gateway_router;
pub mod ledger;
pub mod pricing;
pub mod scheduler;
pub mod subscription;
