use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::{
    app_error::AppResult,
    application::use_cases::subscription::{
        RenewalIntentRepo, SubscriptionRepo, SubscriptionUseCases,
    },
    domain::entities::renewal::RenewalIntent,
};

/// Outcome counters for one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenewalPassStats {
    pub scanned: usize,
    pub claimed: usize,
    pub renewed: usize,
    pub failed: usize,
    /// Due subscriptions whose intent was already claimed elsewhere.
    pub skipped: usize,
}

/// Renewal Scheduler: periodically scans for due subscriptions and drives
/// each one through a claimed renewal intent. Exactly-once per cycle comes
/// from the intent claim, not from scheduling discipline; overlapping or
/// concurrent passes are safe, merely wasteful.
pub struct RenewalScheduler {
    subscriptions: Arc<SubscriptionUseCases>,
    subscription_repo: Arc<dyn SubscriptionRepo>,
    intent_repo: Arc<dyn RenewalIntentRepo>,
    batch_size: i64,
    running: AtomicBool,
}

impl RenewalScheduler {
    pub fn new(
        subscriptions: Arc<SubscriptionUseCases>,
        subscription_repo: Arc<dyn SubscriptionRepo>,
        intent_repo: Arc<dyn RenewalIntentRepo>,
        batch_size: i64,
    ) -> Self {
        Self {
            subscriptions,
            subscription_repo,
            intent_repo,
            batch_size: batch_size.max(1),
            running: AtomicBool::new(false),
        }
    }

    /// Runs one scan over everything due at `now`. If a pass is still in
    /// flight in this process, returns empty stats instead of piling up.
    #[instrument(skip(self))]
    pub async fn run_pass(&self, now: DateTime<Utc>) -> AppResult<RenewalPassStats> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("previous renewal pass still running, skipping this tick");
            return Ok(RenewalPassStats::default());
        }

        let result = self.scan(now).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn scan(&self, now: DateTime<Utc>) -> AppResult<RenewalPassStats> {
        let mut stats = RenewalPassStats::default();
        let mut after_id = None;

        loop {
            let batch = self
                .subscription_repo
                .find_due_for_renewal(now, after_id, self.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }
            after_id = batch.last().map(|s| s.id);
            let batch_len = batch.len();

            for subscription in batch {
                stats.scanned += 1;
                let intent = RenewalIntent::new(
                    subscription.user_id,
                    subscription.id,
                    subscription.payment_count + 1,
                );

                if !self.intent_repo.claim(&intent).await? {
                    debug!(
                        idempotent_key = %intent.idempotent_key,
                        "renewal intent already claimed, skipping"
                    );
                    stats.skipped += 1;
                    continue;
                }
                stats.claimed += 1;

                match self.subscriptions.renew(&intent).await {
                    Ok(_) => stats.renewed += 1,
                    Err(e) => {
                        warn!(
                            subscription_id = %subscription.id,
                            idempotent_key = %intent.idempotent_key,
                            error = %e,
                            "renewal failed"
                        );
                        stats.failed += 1;
                    }
                }
            }

            if (batch_len as i64) < self.batch_size {
                break;
            }
        }

        Ok(stats)
    }

    #[cfg(test)]
    fn mark_running_for_test(&self) {
        self.running.store(true, Ordering::SeqCst);
    }
}
