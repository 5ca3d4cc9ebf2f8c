use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::subscription::RenewalIntentRepo,
    domain::entities::renewal::{RenewalIntent, RenewalStatus},
};

fn row_to_intent(row: &sqlx::postgres::PgRow) -> RenewalIntent {
    RenewalIntent {
        id: row.get("id"),
        user_id: row.get("user_id"),
        subscription_id: row.get("subscription_id"),
        idempotent_key: row.get("idempotent_key"),
        payment_count: row.get("payment_count"),
        status: row.get("status"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, user_id, subscription_id, idempotent_key, payment_count, status,
    created_at, updated_at
"#;

#[async_trait]
impl RenewalIntentRepo for PostgresPersistence {
    async fn claim(&self, intent: &RenewalIntent) -> AppResult<bool> {
        // Insert-or-ignore on the unique idempotent_key; exactly one caller
        // across all processes observes rows_affected == 1.
        let result = sqlx::query(
            r#"
            INSERT INTO renewal_intents (
                id, user_id, subscription_id, idempotent_key, payment_count, status
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (idempotent_key) DO NOTHING
            "#,
        )
        .bind(intent.id)
        .bind(intent.user_id)
        .bind(intent.subscription_id)
        .bind(&intent.idempotent_key)
        .bind(intent.payment_count)
        .bind(intent.status)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_status(&self, id: Uuid, status: RenewalStatus) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE renewal_intents SET status = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn find_by_key(&self, idempotent_key: &str) -> AppResult<Option<RenewalIntent>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM renewal_intents WHERE idempotent_key = $1",
            SELECT_COLS
        ))
        .bind(idempotent_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_intent))
    }
}
