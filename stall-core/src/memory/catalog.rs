use kanau::processor::Processor;

use super::MemoryProcessor;
use crate::entities::event_log::NewEvent;
use crate::entities::products::{
    AdjustProductStock, DEFAULT_LOW_STOCK_ALERT, GetInventory, GetStoreProducts, InventoryRecord,
    ListStoreStock, ProductRecord, StockAdjustmentOutcome, StockLevelRow,
};
use crate::entities::stores::{
    BuyerRecord, GetBuyerById, GetStoreById, SetStorePaymentSecret, StoreRecord,
};
use crate::error::StoreError;
use crate::inventory::{self, AdjustmentPlan};
use stall_sdk::objects::AdjustmentKind;

impl Processor<GetStoreById> for MemoryProcessor {
    type Output = Option<StoreRecord>;
    type Error = StoreError;
    async fn process(&self, query: GetStoreById) -> Result<Option<StoreRecord>, StoreError> {
        Ok(self.state.lock().await.stores.get(&query.store_id).cloned())
    }
}

impl Processor<GetBuyerById> for MemoryProcessor {
    type Output = Option<BuyerRecord>;
    type Error = StoreError;
    async fn process(&self, query: GetBuyerById) -> Result<Option<BuyerRecord>, StoreError> {
        Ok(self.state.lock().await.buyers.get(&query.buyer_id).cloned())
    }
}

impl Processor<SetStorePaymentSecret> for MemoryProcessor {
    type Output = bool;
    type Error = StoreError;
    async fn process(&self, cmd: SetStorePaymentSecret) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.stores.get_mut(&cmd.store_id) {
            Some(store) => {
                store.payment_secret = Some(cmd.encrypted);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Processor<GetStoreProducts> for MemoryProcessor {
    type Output = Vec<ProductRecord>;
    type Error = StoreError;
    async fn process(&self, query: GetStoreProducts) -> Result<Vec<ProductRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(query
            .product_ids
            .iter()
            .filter_map(|id| state.products.get(id))
            .filter(|product| product.store_id == query.store_id)
            .cloned()
            .collect())
    }
}

impl Processor<AdjustProductStock> for MemoryProcessor {
    type Output = Option<StockAdjustmentOutcome>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "MEM:AdjustProductStock")]
    async fn process(
        &self,
        cmd: AdjustProductStock,
    ) -> Result<Option<StockAdjustmentOutcome>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(product) = state
            .products
            .get(&cmd.product_id)
            .filter(|product| product.store_id == cmd.store_id)
            .cloned()
        else {
            return Ok(None);
        };

        let now = time::OffsetDateTime::now_utc();
        let AdjustmentPlan {
            adjustment,
            kind,
            entry,
            event,
        } = inventory::plan_adjustment(product.id, product.stock, cmd.new_stock, now);

        let product = ProductRecord {
            stock: cmd.new_stock,
            ..product
        };
        let mut inventory = state
            .inventories
            .get(&product.id)
            .cloned()
            .unwrap_or_else(|| InventoryRecord {
                product_id: product.id,
                quantity: cmd.new_stock,
                low_stock_alert: DEFAULT_LOW_STOCK_ALERT,
                last_restocked_at: None,
                restock_history: Vec::new(),
            });
        inventory.quantity = cmd.new_stock;
        if kind == AdjustmentKind::Restock {
            inventory.last_restocked_at = Some(entry.date);
        }
        inventory.restock_history.push(entry);

        let mut appended = state.append_events(
            vec![NewEvent::new(cmd.tenant_id, cmd.store_id, event)],
            now,
        )?;
        let Some(event) = appended.pop() else {
            return Err(StoreError::Injected("event log append returned no rows"));
        };

        state.products.insert(product.id, product.clone());
        state.inventories.insert(product.id, inventory.clone());

        Ok(Some(StockAdjustmentOutcome {
            product,
            inventory,
            event,
            adjustment,
            kind,
        }))
    }
}

impl Processor<ListStoreStock> for MemoryProcessor {
    type Output = Vec<StockLevelRow>;
    type Error = StoreError;
    async fn process(&self, query: ListStoreStock) -> Result<Vec<StockLevelRow>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<StockLevelRow> = state
            .products
            .values()
            .filter(|product| product.store_id == query.store_id)
            .map(|product| StockLevelRow {
                product_id: product.id,
                name: product.name.clone(),
                stock: product.stock,
                low_stock_alert: state
                    .inventories
                    .get(&product.id)
                    .map(|inventory| inventory.low_stock_alert),
            })
            .collect();
        rows.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.name.cmp(&b.name)));
        Ok(rows)
    }
}

impl Processor<GetInventory> for MemoryProcessor {
    type Output = Option<InventoryRecord>;
    type Error = StoreError;
    async fn process(&self, query: GetInventory) -> Result<Option<InventoryRecord>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .inventories
            .get(&query.product_id)
            .cloned())
    }
}
