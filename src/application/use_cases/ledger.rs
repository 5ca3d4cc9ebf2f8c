use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::transaction::{NewTransaction, OrderStatus, Transaction},
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedTransactions {
    pub transactions: Vec<Transaction>,
    pub total: i64,
    pub page: i32,
    pub per_page: i32,
    pub total_pages: i32,
}

#[async_trait]
pub trait TransactionRepo: Send + Sync {
    /// Insert-or-ignore on the `(gateway, gateway_uid)` unique constraint.
    /// On collision the already-recorded row is returned, so duplicate
    /// gateway events never abort the caller.
    async fn insert_or_get(&self, tx: &Transaction) -> AppResult<Transaction>;

    async fn find_by_user_and_id(&self, user_id: Uuid, id: Uuid)
    -> AppResult<Option<Transaction>>;

    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: i32,
        per_page: i32,
    ) -> AppResult<(Vec<Transaction>, i64)>;

    /// Whether any transaction by this user references the coupon.
    async fn has_coupon_used(&self, user_id: Uuid, coupon_id: Uuid) -> AppResult<bool>;

    /// Terminal-status update as gateway confirmations arrive.
    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> AppResult<()>;
}

/// Transaction Ledger: the append-only audit trail of every attempted charge.
/// The engine never bypasses it; every gateway attempt, successful or not,
/// lands here.
#[derive(Clone)]
pub struct LedgerUseCases {
    tx_repo: Arc<dyn TransactionRepo>,
}

impl LedgerUseCases {
    pub fn new(tx_repo: Arc<dyn TransactionRepo>) -> Self {
        Self { tx_repo }
    }

    pub async fn record(&self, input: NewTransaction) -> AppResult<Transaction> {
        let tx = Transaction {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            user_id: input.user_id,
            trace_id: input.trace_id,
            tx_type: input.tx_type,
            gateway: input.gateway,
            gateway_uid: input.gateway_uid,
            gateway_payload: input.gateway_payload,
            goods_id: input.goods_id,
            subscription_id: input.subscription_id,
            coupon_ids: input.coupon_ids,
            amount_cents: input.amount_cents,
            order_status: input.order_status,
            message: input.message,
            bank_transfer: input.bank_transfer,
            created_at: None,
            updated_at: None,
        };
        self.tx_repo.insert_or_get(&tx).await
    }

    pub async fn has_coupon_been_used_by(
        &self,
        user_id: Uuid,
        coupon_id: Uuid,
    ) -> AppResult<bool> {
        self.tx_repo.has_coupon_used(user_id, coupon_id).await
    }

    pub async fn find_by_user_and_id(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> AppResult<Option<Transaction>> {
        self.tx_repo.find_by_user_and_id(user_id, id).await
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        page: i32,
        per_page: i32,
    ) -> AppResult<PaginatedTransactions> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let (transactions, total) = self.tx_repo.list_for_user(user_id, page, per_page).await?;
        let total_pages = ((total as f64) / (per_page as f64)).ceil() as i32;
        Ok(PaginatedTransactions {
            transactions,
            total,
            page,
            per_page,
            total_pages,
        })
    }

    pub async fn mark_order_status(&self, id: Uuid, status: OrderStatus) -> AppResult<()> {
        self.tx_repo.update_order_status(id, status).await
    }
}
