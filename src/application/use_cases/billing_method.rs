use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::payment_gateway::AddBillingMethodRequest,
        use_cases::{gateway_router::GatewayRouter, ledger::LedgerUseCases},
    },
    domain::entities::{
        billing_method::BillingMethod,
        transaction::{NewTransaction, OrderStatus, TransactionType},
    },
    infra::crypto::SecretCipher,
};

#[async_trait]
pub trait BillingMethodRepo: Send + Sync {
    async fn find_primary_by_user(&self, user_id: Uuid) -> AppResult<Option<BillingMethod>>;
    async fn find_by_user_and_id(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> AppResult<Option<BillingMethod>>;
    async fn count_active_for_user(&self, user_id: Uuid) -> AppResult<i64>;
    async fn save(&self, billing: &BillingMethod) -> AppResult<()>;
}

/// Stored payment method management: registration through a gateway adapter,
/// encrypted credential storage, and soft deletion.
#[derive(Clone)]
pub struct BillingMethodUseCases {
    billing_repo: Arc<dyn BillingMethodRepo>,
    ledger: Arc<LedgerUseCases>,
    router: Arc<GatewayRouter>,
    cipher: SecretCipher,
}

impl BillingMethodUseCases {
    pub fn new(
        billing_repo: Arc<dyn BillingMethodRepo>,
        ledger: Arc<LedgerUseCases>,
        router: Arc<GatewayRouter>,
        cipher: SecretCipher,
    ) -> Self {
        Self {
            billing_repo,
            ledger,
            router,
            cipher,
        }
    }

    #[instrument(skip(self, request))]
    pub async fn add(
        &self,
        user_id: Uuid,
        gateway: &str,
        request: AddBillingMethodRequest,
    ) -> AppResult<BillingMethod> {
        let adapter = self.router.resolve(gateway)?;
        let trace_id = Uuid::new_v4().to_string();

        let registered = adapter
            .add_billing_method(user_id, &trace_id, &request)
            .await?;

        let tx = self
            .ledger
            .record(NewTransaction {
                id: None,
                user_id,
                trace_id: trace_id.clone(),
                tx_type: TransactionType::BillingAddCard,
                gateway: gateway.to_string(),
                gateway_uid: registered.gateway_uid.clone(),
                gateway_payload: registered.payload.clone(),
                goods_id: None,
                subscription_id: None,
                coupon_ids: vec![],
                amount_cents: 0,
                order_status: OrderStatus::Paid,
                message: "billing method registered".into(),
                bank_transfer: None,
            })
            .await?;

        let is_primary = self.billing_repo.count_active_for_user(user_id).await? == 0;
        let billing = BillingMethod {
            id: Uuid::new_v4(),
            user_id,
            gateway: gateway.to_string(),
            secret_encrypted: Some(self.cipher.encrypt(&registered.secret)?),
            deleted: false,
            is_primary,
            transaction_id: Some(tx.id),
            created_at: None,
            updated_at: None,
        };
        self.billing_repo.save(&billing).await?;
        Ok(billing)
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: Uuid, billing_id: Uuid) -> AppResult<()> {
        let mut billing = self
            .billing_repo
            .find_by_user_and_id(user_id, billing_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if billing.deleted {
            return Err(AppError::Conflict("billing method already removed".into()));
        }

        let adapter = self.router.resolve_for(&billing)?;
        let trace_id = Uuid::new_v4().to_string();
        adapter
            .remove_billing_method(user_id, &trace_id, &billing)
            .await?;

        self.ledger
            .record(NewTransaction {
                id: None,
                user_id,
                trace_id,
                tx_type: TransactionType::BillingRemoveCard,
                gateway: billing.gateway.clone(),
                gateway_uid: format!("remove-{}", billing.id),
                gateway_payload: serde_json::json!({}),
                goods_id: None,
                subscription_id: None,
                coupon_ids: vec![],
                amount_cents: 0,
                order_status: OrderStatus::Paid,
                message: "billing method removed".into(),
                bank_transfer: None,
            })
            .await?;

        // Soft delete; the credential token is dropped, the row is kept for
        // the audit linkage.
        billing.deleted = true;
        billing.is_primary = false;
        billing.secret_encrypted = None;
        self.billing_repo.save(&billing).await
    }

    pub async fn primary_for(&self, user_id: Uuid) -> AppResult<BillingMethod> {
        self.billing_repo
            .find_primary_by_user(user_id)
            .await?
            .ok_or(AppError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::dummy_gateway::DummyGateway;
    use crate::test_utils::mocks::{InMemoryBillingMethodRepo, InMemoryTransactionRepo};

    fn use_cases(
        billing_repo: Arc<InMemoryBillingMethodRepo>,
    ) -> (BillingMethodUseCases, Arc<LedgerUseCases>) {
        let ledger = Arc::new(LedgerUseCases::new(Arc::new(
            InMemoryTransactionRepo::new(),
        )));
        let router = Arc::new(GatewayRouter::new().register(Arc::new(DummyGateway::new())));
        (
            BillingMethodUseCases::new(
                billing_repo,
                ledger.clone(),
                router,
                SecretCipher::for_tests(),
            ),
            ledger,
        )
    }

    #[tokio::test]
    async fn first_method_becomes_primary_and_secret_is_encrypted() {
        let repo = Arc::new(InMemoryBillingMethodRepo::new());
        let (uc, ledger) = use_cases(repo.clone());
        let user_id = Uuid::new_v4();

        let billing = uc
            .add(
                user_id,
                "dummy",
                AddBillingMethodRequest {
                    credential: "tok_card".into(),
                },
            )
            .await
            .unwrap();

        assert!(billing.is_primary);
        let stored = billing.secret_encrypted.unwrap();
        assert!(!stored.contains("tok_card"));
        assert!(billing.transaction_id.is_some());

        let page = ledger.list_for_user(user_id, 1, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(
            page.transactions[0].tx_type,
            TransactionType::BillingAddCard
        );

        let second = uc
            .add(
                user_id,
                "dummy",
                AddBillingMethodRequest {
                    credential: "tok_other".into(),
                },
            )
            .await
            .unwrap();
        assert!(!second.is_primary);
    }

    #[tokio::test]
    async fn remove_soft_deletes_and_clears_secret() {
        let repo = Arc::new(InMemoryBillingMethodRepo::new());
        let (uc, _) = use_cases(repo.clone());
        let user_id = Uuid::new_v4();

        let billing = uc
            .add(
                user_id,
                "dummy",
                AddBillingMethodRequest {
                    credential: "tok_card".into(),
                },
            )
            .await
            .unwrap();

        uc.remove(user_id, billing.id).await.unwrap();

        let stored = repo
            .find_by_user_and_id(user_id, billing.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.deleted);
        assert!(stored.secret_encrypted.is_none());
        assert!(matches!(uc.primary_for(user_id).await, Err(AppError::NotFound)));

        // Removing twice is a conflict.
        assert!(matches!(
            uc.remove(user_id, billing.id).await,
            Err(AppError::Conflict(_))
        ));
    }
}
