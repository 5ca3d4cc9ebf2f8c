use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_json_with_fallback},
    app_error::{AppError, AppResult},
    application::use_cases::pricing::CouponRepo,
    domain::entities::coupon::{Coupon, CouponUsage},
};

fn row_to_coupon(row: &sqlx::postgres::PgRow) -> Coupon {
    let id: Uuid = row.get("id");
    Coupon {
        id,
        code: row.get("code"),
        coupon_type: row.get("coupon_type"),
        count: row.get("count"),
        once_per_user: row.get("once_per_user"),
        discounts: parse_json_with_fallback(
            &row.get::<serde_json::Value, _>("discounts"),
            "discounts",
            "coupon",
            &id.to_string(),
        ),
        created_at: row.get("created_at"),
    }
}

const SELECT_COLS: &str = "id, code, coupon_type, count, once_per_user, discounts, created_at";

#[async_trait]
impl CouponRepo for PostgresPersistence {
    async fn find_by_code(&self, code: &str) -> AppResult<Option<Coupon>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM coupons WHERE code = $1",
            SELECT_COLS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_coupon))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Coupon>> {
        let row = sqlx::query(&format!("SELECT {} FROM coupons WHERE id = $1", SELECT_COLS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_coupon))
    }

    async fn ensure_usage(&self, coupon_id: Uuid, initial: i64) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO coupon_usages (coupon_id, remaining)
             VALUES ($1, $2)
             ON CONFLICT (coupon_id) DO NOTHING",
        )
        .bind(coupon_id)
        .bind(initial)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn decrement_remaining(&self, coupon_id: Uuid) -> AppResult<bool> {
        // Single conditional UPDATE; the WHERE clause is the oversell guard.
        let result = sqlx::query(
            "UPDATE coupon_usages
             SET remaining = remaining - 1, updated_at = now()
             WHERE coupon_id = $1 AND remaining > 0",
        )
        .bind(coupon_id)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_usage(&self, coupon_id: Uuid) -> AppResult<Option<CouponUsage>> {
        let row = sqlx::query(
            "SELECT coupon_id, remaining, updated_at FROM coupon_usages WHERE coupon_id = $1",
        )
        .bind(coupon_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(|r| CouponUsage {
            coupon_id: r.get("coupon_id"),
            remaining: r.get("remaining"),
            updated_at: r.get("updated_at"),
        }))
    }
}
