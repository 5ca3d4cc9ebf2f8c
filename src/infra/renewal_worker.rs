use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info};

use crate::application::use_cases::scheduler::RenewalScheduler;

pub async fn run_renewal_loop(scheduler: Arc<RenewalScheduler>, interval_secs: u64) {
    let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));

    info!("Renewal worker started (ticking every {}s)", interval_secs);

    loop {
        ticker.tick().await;
        match scheduler.run_pass(Utc::now()).await {
            Ok(stats) if stats.scanned > 0 => {
                info!(
                    scanned = stats.scanned,
                    claimed = stats.claimed,
                    renewed = stats.renewed,
                    failed = stats.failed,
                    skipped = stats.skipped,
                    "Renewal pass complete"
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Renewal pass aborted");
            }
        }
    }
}
