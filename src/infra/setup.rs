use std::fs::File;
use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    application::use_cases::{
        billing_method::{BillingMethodRepo, BillingMethodUseCases},
        gateway_router::GatewayRouter,
        ledger::{LedgerUseCases, TransactionRepo},
        pricing::{CouponRepo, GoodsRepo, PricingUseCases},
        scheduler::RenewalScheduler,
        subscription::{
            RenewalIntentRepo, SubscriptionLogRepo, SubscriptionRepo, SubscriptionUseCases,
        },
    },
    infra::{
        config::AppConfig, crypto::SecretCipher, dummy_gateway::DummyGateway,
        postgres_persistence,
    },
};

/// Fully wired engine: every use-case struct plus the scheduler, sharing one
/// persistence layer.
pub struct EngineState {
    pub config: Arc<AppConfig>,
    pub pricing: Arc<PricingUseCases>,
    pub ledger: Arc<LedgerUseCases>,
    pub billing_methods: Arc<BillingMethodUseCases>,
    pub subscriptions: Arc<SubscriptionUseCases>,
    pub scheduler: Arc<RenewalScheduler>,
}

pub async fn init_engine() -> anyhow::Result<EngineState> {
    let config = AppConfig::from_env();

    let cipher = SecretCipher::new_from_base64(config.billing_secret_key.expose_secret())?;
    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);

    let goods_repo = postgres_arc.clone() as Arc<dyn GoodsRepo>;
    let coupon_repo = postgres_arc.clone() as Arc<dyn CouponRepo>;
    let tx_repo = postgres_arc.clone() as Arc<dyn TransactionRepo>;
    let billing_repo = postgres_arc.clone() as Arc<dyn BillingMethodRepo>;
    let subscription_repo = postgres_arc.clone() as Arc<dyn SubscriptionRepo>;
    let log_repo = postgres_arc.clone() as Arc<dyn SubscriptionLogRepo>;
    let intent_repo = postgres_arc.clone() as Arc<dyn RenewalIntentRepo>;

    let router = Arc::new(GatewayRouter::new().register(Arc::new(DummyGateway::new())));

    let pricing = Arc::new(PricingUseCases::new(
        goods_repo,
        coupon_repo,
        tx_repo.clone(),
    ));
    let ledger = Arc::new(LedgerUseCases::new(tx_repo));
    let billing_methods = Arc::new(BillingMethodUseCases::new(
        billing_repo.clone(),
        ledger.clone(),
        router.clone(),
        cipher,
    ));
    let subscriptions = Arc::new(SubscriptionUseCases::new(
        subscription_repo.clone(),
        log_repo,
        intent_repo.clone(),
        billing_repo,
        pricing.clone(),
        ledger.clone(),
        router,
        config.renewal_failure_policy,
    ));
    let scheduler = Arc::new(RenewalScheduler::new(
        subscriptions.clone(),
        subscription_repo,
        intent_repo,
        config.renewal_batch_size,
    ));

    Ok(EngineState {
        config: Arc::new(config),
        pricing,
        ledger,
        billing_methods,
        subscriptions,
        scheduler,
    })
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "subcycle=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer().with_target(false).with_level(true).pretty();

    // File (structured JSON logs)
    let file = File::create("app.log").expect("cannot create log file");
    let json_layer = fmt::layer()
        .json()
        .with_writer(file)
        .with_current_span(true)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
