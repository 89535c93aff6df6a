use crate::error::StoreError;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoreRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    /// Payment provider secret in `iv:tag:ciphertext` form (or legacy plaintext).
    pub payment_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct BuyerRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GetStoreById {
    pub store_id: Uuid,
}

impl Processor<GetStoreById> for DatabaseProcessor {
    type Output = Option<StoreRecord>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:GetStoreById")]
    async fn process(&self, query: GetStoreById) -> Result<Option<StoreRecord>, StoreError> {
        let store = sqlx::query_as::<_, StoreRecord>(
            r#"
            SELECT id, tenant_id, name, payment_secret
            FROM stores
            WHERE id = $1
            "#,
        )
        .bind(query.store_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(store)
    }
}

#[derive(Debug, Clone)]
pub struct GetBuyerById {
    pub buyer_id: Uuid,
}

impl Processor<GetBuyerById> for DatabaseProcessor {
    type Output = Option<BuyerRecord>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:GetBuyerById")]
    async fn process(&self, query: GetBuyerById) -> Result<Option<BuyerRecord>, StoreError> {
        let buyer = sqlx::query_as::<_, BuyerRecord>(
            r#"
            SELECT id, tenant_id, email
            FROM buyers
            WHERE id = $1
            "#,
        )
        .bind(query.buyer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(buyer)
    }
}

#[derive(Debug, Clone)]
/// Replace the stored provider secret. `encrypted` must already be in
/// at-rest form. Returns `false` if the store does not exist.
pub struct SetStorePaymentSecret {
    pub store_id: Uuid,
    pub encrypted: String,
}

impl Processor<SetStorePaymentSecret> for DatabaseProcessor {
    type Output = bool;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:SetStorePaymentSecret")]
    async fn process(&self, cmd: SetStorePaymentSecret) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE stores
            SET payment_secret = $2
            WHERE id = $1
            "#,
        )
        .bind(cmd.store_id)
        .bind(cmd.encrypted)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
