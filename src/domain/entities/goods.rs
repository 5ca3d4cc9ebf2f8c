use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Goods {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoodsOption {
    pub id: Uuid,
    pub goods_id: Uuid,
    pub name: String,
    pub additional_price_cents: i64,
    pub created_at: Option<DateTime<Utc>>,
}
