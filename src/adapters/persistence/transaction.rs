use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_json_with_fallback},
    app_error::{AppError, AppResult},
    application::use_cases::ledger::TransactionRepo,
    domain::entities::transaction::{BankTransferInfo, OrderStatus, Transaction},
};

fn row_to_transaction(row: &sqlx::postgres::PgRow) -> Transaction {
    let id: Uuid = row.get("id");
    let bank_transfer = row
        .get::<Option<serde_json::Value>, _>("bank_transfer")
        .filter(|v| !v.is_null())
        .and_then(|v| serde_json::from_value::<BankTransferInfo>(v).ok());
    Transaction {
        id,
        user_id: row.get("user_id"),
        trace_id: row.get("trace_id"),
        tx_type: row.get("tx_type"),
        gateway: row.get("gateway"),
        gateway_uid: row.get("gateway_uid"),
        gateway_payload: row.get("gateway_payload"),
        goods_id: row.get("goods_id"),
        subscription_id: row.get("subscription_id"),
        coupon_ids: parse_json_with_fallback(
            &row.get::<serde_json::Value, _>("coupon_ids"),
            "coupon_ids",
            "transaction",
            &id.to_string(),
        ),
        amount_cents: row.get("amount_cents"),
        order_status: row.get("order_status"),
        message: row.get("message"),
        bank_transfer,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, user_id, trace_id, tx_type, gateway, gateway_uid, gateway_payload,
    goods_id, subscription_id, coupon_ids, amount_cents, order_status,
    message, bank_transfer, created_at, updated_at
"#;

#[async_trait]
impl TransactionRepo for PostgresPersistence {
    async fn insert_or_get(&self, tx: &Transaction) -> AppResult<Transaction> {
        let coupon_ids = serde_json::to_value(&tx.coupon_ids)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let bank_transfer = tx
            .bank_transfer
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO transactions (
                id, user_id, trace_id, tx_type, gateway, gateway_uid, gateway_payload,
                goods_id, subscription_id, coupon_ids, amount_cents, order_status,
                message, bank_transfer
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (gateway, gateway_uid) DO NOTHING
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(tx.id)
        .bind(tx.user_id)
        .bind(&tx.trace_id)
        .bind(tx.tx_type)
        .bind(&tx.gateway)
        .bind(&tx.gateway_uid)
        .bind(&tx.gateway_payload)
        .bind(tx.goods_id)
        .bind(tx.subscription_id)
        .bind(coupon_ids)
        .bind(tx.amount_cents)
        .bind(tx.order_status)
        .bind(&tx.message)
        .bind(bank_transfer)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        if let Some(row) = row {
            return Ok(row_to_transaction(&row));
        }

        // Lost the insert race; the earlier row is the record of truth.
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE gateway = $1 AND gateway_uid = $2",
            SELECT_COLS
        ))
        .bind(&tx.gateway)
        .bind(&tx.gateway_uid)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_transaction(&row))
    }

    async fn find_by_user_and_id(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> AppResult<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE user_id = $1 AND id = $2",
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_transaction))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: i32,
        per_page: i32,
    ) -> AppResult<(Vec<Transaction>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::from)?;

        let offset = i64::from((page - 1) * per_page);
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok((rows.iter().map(row_to_transaction).collect(), total))
    }

    async fn has_coupon_used(&self, user_id: Uuid, coupon_id: Uuid) -> AppResult<bool> {
        let used: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM transactions
                WHERE user_id = $1 AND coupon_ids @> $2::jsonb
            )",
        )
        .bind(user_id)
        .bind(serde_json::json!([coupon_id]))
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(used)
    }

    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE transactions SET order_status = $2, updated_at = now() WHERE id = $1",
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
}
