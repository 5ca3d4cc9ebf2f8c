use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::billing_method::BillingMethodRepo,
    domain::entities::billing_method::BillingMethod,
};

fn row_to_billing(row: &sqlx::postgres::PgRow) -> BillingMethod {
    BillingMethod {
        id: row.get("id"),
        user_id: row.get("user_id"),
        gateway: row.get("gateway"),
        secret_encrypted: row.get("secret_encrypted"),
        deleted: row.get("deleted"),
        is_primary: row.get("is_primary"),
        transaction_id: row.get("transaction_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, user_id, gateway, secret_encrypted, deleted, is_primary,
    transaction_id, created_at, updated_at
"#;

#[async_trait]
impl BillingMethodRepo for PostgresPersistence {
    async fn find_primary_by_user(&self, user_id: Uuid) -> AppResult<Option<BillingMethod>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM billing_methods
             WHERE user_id = $1 AND is_primary AND NOT deleted",
            SELECT_COLS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_billing))
    }

    async fn find_by_user_and_id(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> AppResult<Option<BillingMethod>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM billing_methods WHERE user_id = $1 AND id = $2",
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_billing))
    }

    async fn count_active_for_user(&self, user_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM billing_methods WHERE user_id = $1 AND NOT deleted",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(count)
    }

    async fn save(&self, billing: &BillingMethod) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO billing_methods (
                id, user_id, gateway, secret_encrypted, deleted, is_primary, transaction_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                secret_encrypted = EXCLUDED.secret_encrypted,
                deleted = EXCLUDED.deleted,
                is_primary = EXCLUDED.is_primary,
                updated_at = now()
            "#,
        )
        .bind(billing.id)
        .bind(billing.user_id)
        .bind(&billing.gateway)
        .bind(&billing.secret_encrypted)
        .bind(billing.deleted)
        .bind(billing.is_primary)
        .bind(billing.transaction_id)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }
}
