use crate::entities::event_log::{EventLogRecord, NewEvent};
use crate::error::StoreError;
use crate::framework::DatabaseProcessor;
use crate::inventory::{self, AdjustmentPlan};
use kanau::processor::Processor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stall_sdk::objects::AdjustmentKind;
use uuid::Uuid;

/// Low-stock threshold given to lazily created inventory rows.
pub const DEFAULT_LOW_STOCK_ALERT: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ProductRecord {
    pub id: Uuid,
    pub store_id: Uuid,
    pub name: String,
    pub price: Decimal,
    /// Denormalized stock level. Mirrors `InventoryRecord::quantity`.
    pub stock: i32,
}

/// One entry of an inventory's restock history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestockEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub date: time::OffsetDateTime,
    pub prev_quantity: i32,
    pub new_quantity: i32,
    pub added: i32,
    pub kind: AdjustmentKind,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct InventoryRecord {
    pub product_id: Uuid,
    pub quantity: i32,
    pub low_stock_alert: i32,
    pub last_restocked_at: Option<time::OffsetDateTime>,
    /// Append-only, oldest first.
    #[sqlx(json)]
    pub restock_history: Vec<RestockEntry>,
}

impl ProductRecord {
    /// Lock the given products for the rest of the transaction.
    ///
    /// Rows are locked in id order so concurrent transitions touching the
    /// same products cannot deadlock.
    pub async fn lock_many_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        product_ids: &[Uuid],
    ) -> Result<Vec<ProductRecord>, StoreError> {
        let products = sqlx::query_as::<_, ProductRecord>(
            r#"
            SELECT id, store_id, name, price, stock
            FROM products
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(product_ids)
        .fetch_all(&mut **tx)
        .await?;
        Ok(products)
    }

    /// Set the stock level and mirror it into the inventory row, if one
    /// exists.
    pub async fn set_stock_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        product_id: Uuid,
        stock: i32,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE products
            SET stock = $2
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .bind(stock)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE inventories
            SET quantity = $2
            WHERE product_id = $1
            "#,
        )
        .bind(product_id)
        .bind(stock)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Products of one store with the given ids. Ids that do not exist or
/// belong to another store are absent from the result.
pub struct GetStoreProducts {
    pub store_id: Uuid,
    pub product_ids: Vec<Uuid>,
}

impl Processor<GetStoreProducts> for DatabaseProcessor {
    type Output = Vec<ProductRecord>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:GetStoreProducts")]
    async fn process(&self, query: GetStoreProducts) -> Result<Vec<ProductRecord>, StoreError> {
        let products = sqlx::query_as::<_, ProductRecord>(
            r#"
            SELECT id, store_id, name, price, stock
            FROM products
            WHERE store_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(query.store_id)
        .bind(&query.product_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }
}

#[derive(Debug, Clone)]
/// Set a product's stock to an absolute level and record the change in
/// the restock history and event log.
pub struct AdjustProductStock {
    pub tenant_id: Uuid,
    pub store_id: Uuid,
    pub product_id: Uuid,
    pub new_stock: i32,
}

/// Committed result of a manual stock change.
#[derive(Debug, Clone, PartialEq)]
pub struct StockAdjustmentOutcome {
    pub product: ProductRecord,
    pub inventory: InventoryRecord,
    pub event: EventLogRecord,
    pub adjustment: i32,
    pub kind: AdjustmentKind,
}

impl Processor<AdjustProductStock> for DatabaseProcessor {
    type Output = Option<StockAdjustmentOutcome>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:AdjustProductStock")]
    async fn process(
        &self,
        cmd: AdjustProductStock,
    ) -> Result<Option<StockAdjustmentOutcome>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let product = sqlx::query_as::<_, ProductRecord>(
            r#"
            SELECT id, store_id, name, price, stock
            FROM products
            WHERE id = $1 AND store_id = $2
            FOR UPDATE
            "#,
        )
        .bind(cmd.product_id)
        .bind(cmd.store_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(mut product) = product else {
            return Ok(None);
        };

        let AdjustmentPlan {
            adjustment,
            kind,
            entry,
            event,
        } = inventory::plan_adjustment(
            product.id,
            product.stock,
            cmd.new_stock,
            time::OffsetDateTime::now_utc(),
        );
        let restocked_at = (kind == AdjustmentKind::Restock).then_some(entry.date);

        sqlx::query(
            r#"
            UPDATE products
            SET stock = $2
            WHERE id = $1
            "#,
        )
        .bind(product.id)
        .bind(cmd.new_stock)
        .execute(&mut *tx)
        .await?;
        product.stock = cmd.new_stock;

        let inventory = sqlx::query_as::<_, InventoryRecord>(
            r#"
            INSERT INTO inventories
                (product_id, quantity, low_stock_alert, last_restocked_at, restock_history)
            VALUES ($1, $2, $3, $4, jsonb_build_array($5::jsonb))
            ON CONFLICT (product_id) DO UPDATE
            SET quantity = EXCLUDED.quantity,
                last_restocked_at = COALESCE(EXCLUDED.last_restocked_at, inventories.last_restocked_at),
                restock_history = inventories.restock_history || EXCLUDED.restock_history
            RETURNING product_id, quantity, low_stock_alert, last_restocked_at, restock_history
            "#,
        )
        .bind(product.id)
        .bind(cmd.new_stock)
        .bind(DEFAULT_LOW_STOCK_ALERT)
        .bind(restocked_at)
        .bind(sqlx::types::Json(&entry))
        .fetch_one(&mut *tx)
        .await?;

        let event = EventLogRecord::insert_tx(
            &mut tx,
            &NewEvent::new(cmd.tenant_id, cmd.store_id, event),
        )
        .await?;

        tx.commit().await?;

        Ok(Some(StockAdjustmentOutcome {
            product,
            inventory,
            event,
            adjustment,
            kind,
        }))
    }
}

/// Stock level of one product with its alert threshold, if an inventory
/// row exists.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StockLevelRow {
    pub product_id: Uuid,
    pub name: String,
    pub stock: i32,
    pub low_stock_alert: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ListStoreStock {
    pub store_id: Uuid,
}

impl Processor<ListStoreStock> for DatabaseProcessor {
    type Output = Vec<StockLevelRow>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:ListStoreStock")]
    async fn process(&self, query: ListStoreStock) -> Result<Vec<StockLevelRow>, StoreError> {
        let rows = sqlx::query_as::<_, StockLevelRow>(
            r#"
            SELECT p.id AS product_id, p.name, p.stock, i.low_stock_alert
            FROM products p
            LEFT JOIN inventories i ON i.product_id = p.id
            WHERE p.store_id = $1
            ORDER BY p.stock ASC, p.name ASC
            "#,
        )
        .bind(query.store_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Debug, Clone)]
pub struct GetInventory {
    pub product_id: Uuid,
}

impl Processor<GetInventory> for DatabaseProcessor {
    type Output = Option<InventoryRecord>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:GetInventory")]
    async fn process(&self, query: GetInventory) -> Result<Option<InventoryRecord>, StoreError> {
        let inventory = sqlx::query_as::<_, InventoryRecord>(
            r#"
            SELECT product_id, quantity, low_stock_alert, last_restocked_at, restock_history
            FROM inventories
            WHERE product_id = $1
            "#,
        )
        .bind(query.product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(inventory)
    }
}
