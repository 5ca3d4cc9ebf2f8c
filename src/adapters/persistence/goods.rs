use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::pricing::GoodsRepo,
    domain::entities::goods::{Goods, GoodsOption},
};

fn row_to_goods(row: &sqlx::postgres::PgRow) -> Goods {
    Goods {
        id: row.get("id"),
        name: row.get("name"),
        price_cents: row.get("price_cents"),
        created_at: row.get("created_at"),
    }
}

fn row_to_option(row: &sqlx::postgres::PgRow) -> GoodsOption {
    GoodsOption {
        id: row.get("id"),
        goods_id: row.get("goods_id"),
        name: row.get("name"),
        additional_price_cents: row.get("additional_price_cents"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl GoodsRepo for PostgresPersistence {
    async fn get(
        &self,
        goods_id: Uuid,
        option_id: Option<Uuid>,
    ) -> AppResult<(Goods, Option<GoodsOption>)> {
        let row = sqlx::query(
            "SELECT id, name, price_cents, created_at FROM goods WHERE id = $1",
        )
        .bind(goods_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?
        .ok_or(AppError::NotFound)?;
        let goods = row_to_goods(&row);

        let option = match option_id {
            None => None,
            Some(id) => {
                let row = sqlx::query(
                    "SELECT id, goods_id, name, additional_price_cents, created_at
                     FROM goods_options WHERE id = $1 AND goods_id = $2",
                )
                .bind(id)
                .bind(goods_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(AppError::from)?
                .ok_or(AppError::NotFound)?;
                Some(row_to_option(&row))
            }
        };

        Ok((goods, option))
    }
}
