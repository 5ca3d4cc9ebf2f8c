use dotenvy::dotenv;

use subcycle::infra::{
    renewal_worker::run_renewal_loop,
    setup::{init_engine, init_tracing},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let engine = init_engine().await?;

    let interval_secs = engine.config.renewal_interval_secs;
    run_renewal_loop(engine.scheduler.clone(), interval_secs).await;

    Ok(())
}
