use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;

use crate::application::use_cases::subscription::RenewalFailurePolicy;

pub struct AppConfig {
    pub database_url: String,
    /// Base64-encoded 32-byte key for billing credential encryption at rest.
    pub billing_secret_key: SecretString,
    pub renewal_interval_secs: u64,
    pub renewal_batch_size: i64,
    pub renewal_failure_policy: RenewalFailurePolicy,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url: String = get_env("DATABASE_URL");
        let billing_secret_key: SecretString =
            SecretString::new(get_env::<String>("BILLING_SECRET_KEY").into());

        let renewal_interval_secs: u64 = get_env_default("RENEWAL_INTERVAL_SECS", 3_600);
        let renewal_batch_size: i64 = get_env_default("RENEWAL_BATCH_SIZE", 100);
        let renewal_failure_policy: RenewalFailurePolicy =
            get_env_default("RENEWAL_FAILURE_POLICY", "mark_past_due".to_string())
                .parse()
                .expect("RENEWAL_FAILURE_POLICY must be mark_past_due or keep_active");

        Self {
            database_url,
            billing_secret_key,
            renewal_interval_secs,
            renewal_batch_size,
            renewal_failure_policy,
        }
    }
}
