use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_json_with_fallback},
    app_error::{AppError, AppResult},
    application::use_cases::subscription::{SubscriptionLogRepo, SubscriptionRepo},
    domain::entities::subscription::{Subscription, SubscriptionLog, SubscriptionStatus},
};

fn row_to_subscription(row: &sqlx::postgres::PgRow) -> Subscription {
    let id: Uuid = row.get("id");
    Subscription {
        id,
        user_id: row.get("user_id"),
        goods_id: row.get("goods_id"),
        option_id: row.get("option_id"),
        version: row.get("version"),
        billing_id: row.get("billing_id"),
        status: row.get("status"),
        scheduled_option_id: row.get("scheduled_option_id"),
        billing_cycle_days: row.get("billing_cycle_days"),
        valid_from: row.get("valid_from"),
        valid_to: row.get("valid_to"),
        used_coupon_ids: parse_json_with_fallback(
            &row.get::<serde_json::Value, _>("used_coupon_ids"),
            "used_coupon_ids",
            "subscription",
            &id.to_string(),
        ),
        payment_count: row.get("payment_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_log(row: &sqlx::postgres::PgRow) -> SubscriptionLog {
    SubscriptionLog {
        id: row.get("id"),
        user_id: row.get("user_id"),
        subscription_id: row.get("subscription_id"),
        trace_id: row.get("trace_id"),
        status: row.get("status"),
        from_option_id: row.get("from_option_id"),
        to_option_id: row.get("to_option_id"),
        reason: row.get("reason"),
        created_at: row.get("created_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, user_id, goods_id, option_id, version, billing_id, status,
    scheduled_option_id, billing_cycle_days, valid_from, valid_to,
    used_coupon_ids, payment_count, created_at, updated_at
"#;

#[async_trait]
impl SubscriptionRepo for PostgresPersistence {
    async fn create(&self, subscription: &Subscription) -> AppResult<()> {
        let used_coupon_ids = serde_json::to_value(&subscription.used_coupon_ids)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        // The (user_id, goods_id, version) unique index turns a concurrent
        // start into Conflict via the sqlx error mapping.
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, goods_id, option_id, version, billing_id, status,
                scheduled_option_id, billing_cycle_days, valid_from, valid_to,
                used_coupon_ids, payment_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.user_id)
        .bind(subscription.goods_id)
        .bind(subscription.option_id)
        .bind(subscription.version)
        .bind(subscription.billing_id)
        .bind(subscription.status)
        .bind(subscription.scheduled_option_id)
        .bind(subscription.billing_cycle_days)
        .bind(subscription.valid_from)
        .bind(subscription.valid_to)
        .bind(used_coupon_ids)
        .bind(subscription.payment_count)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_subscription))
    }

    async fn latest_by_user_goods(
        &self,
        user_id: Uuid,
        goods_id: Uuid,
    ) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions
             WHERE user_id = $1 AND goods_id = $2
             ORDER BY version DESC
             LIMIT 1",
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(goods_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_subscription))
    }

    async fn current_by_user_goods(
        &self,
        user_id: Uuid,
        goods_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions
             WHERE user_id = $1 AND goods_id = $2
               AND status <> 'canceled' AND valid_to > $3
             ORDER BY version DESC
             LIMIT 1",
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(goods_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_subscription))
    }

    async fn update(&self, subscription: &Subscription) -> AppResult<()> {
        let used_coupon_ids = serde_json::to_value(&subscription.used_coupon_ids)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                option_id = $2,
                billing_id = $3,
                status = $4,
                scheduled_option_id = $5,
                valid_from = $6,
                valid_to = $7,
                used_coupon_ids = $8,
                payment_count = $9,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.option_id)
        .bind(subscription.billing_id)
        .bind(subscription.status)
        .bind(subscription.scheduled_option_id)
        .bind(subscription.valid_from)
        .bind(subscription.valid_to)
        .bind(used_coupon_ids)
        .bind(subscription.payment_count)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        goods_id: Option<Uuid>,
        status: Option<SubscriptionStatus>,
        page: i32,
        per_page: i32,
    ) -> AppResult<(Vec<Subscription>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM subscriptions
             WHERE user_id = $1
               AND ($2::uuid IS NULL OR goods_id = $2)
               AND ($3::subscription_status IS NULL OR status = $3)",
        )
        .bind(user_id)
        .bind(goods_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        let offset = i64::from((page - 1) * per_page);
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscriptions
             WHERE user_id = $1
               AND ($2::uuid IS NULL OR goods_id = $2)
               AND ($3::subscription_status IS NULL OR status = $3)
             ORDER BY goods_id, version DESC
             LIMIT $4 OFFSET $5",
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(goods_id)
        .bind(status)
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok((rows.iter().map(row_to_subscription).collect(), total))
    }

    async fn find_due_for_renewal(
        &self,
        now: DateTime<Utc>,
        after_id: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscriptions
             WHERE status = ANY(ARRAY['active', 'pending_change']::subscription_status[])
               AND valid_to <= $1
               AND ($2::uuid IS NULL OR id > $2)
             ORDER BY id
             LIMIT $3",
            SELECT_COLS
        ))
        .bind(now)
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_subscription).collect())
    }
}

#[async_trait]
impl SubscriptionLogRepo for PostgresPersistence {
    async fn append(&self, log: &SubscriptionLog) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscription_logs (
                id, user_id, subscription_id, trace_id, status,
                from_option_id, to_option_id, reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(log.id)
        .bind(log.user_id)
        .bind(log.subscription_id)
        .bind(&log.trace_id)
        .bind(log.status)
        .bind(log.from_option_id)
        .bind(log.to_option_id)
        .bind(&log.reason)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn list_for_subscription(
        &self,
        subscription_id: Uuid,
    ) -> AppResult<Vec<SubscriptionLog>> {
        let rows = sqlx::query(
            "SELECT id, user_id, subscription_id, trace_id, status,
                    from_option_id, to_option_id, reason, created_at
             FROM subscription_logs
             WHERE subscription_id = $1
             ORDER BY created_at",
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_log).collect())
    }
}
