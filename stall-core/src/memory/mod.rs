//! In-memory persistence.
//!
//! Implements every processor of [`CommerceStore`](crate::framework::CommerceStore)
//! over plain collections behind one `tokio::sync::Mutex`. Each write
//! holds the lock for its whole duration, which gives the same
//! serialization the PostgreSQL backend gets from row and advisory locks.
//! Writes stage their changes, append their events, and only then apply
//! the staged changes, so a failed append leaves no partial state.

mod catalog;
mod events;
mod orders;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::entities::event_log::{EventLogRecord, NewEvent};
use crate::entities::order_records::{OrderDetail, OrderItemRecord, OrderRecord};
use crate::entities::products::{InventoryRecord, ProductRecord};
use crate::entities::stores::{BuyerRecord, StoreRecord};
use crate::entities::OrderStatus;
use crate::error::StoreError;

#[derive(Debug, Default)]
struct MemoryState {
    stores: HashMap<Uuid, StoreRecord>,
    buyers: HashMap<Uuid, BuyerRecord>,
    products: BTreeMap<Uuid, ProductRecord>,
    inventories: HashMap<Uuid, InventoryRecord>,
    orders: HashMap<Uuid, OrderRecord>,
    items: HashMap<Uuid, Vec<OrderItemRecord>>,
    events: Vec<EventLogRecord>,
    next_item_id: i64,
    fail_event_appends: bool,
}

impl MemoryState {
    fn detail(&self, order_id: Uuid) -> Option<OrderDetail> {
        let order = self.orders.get(&order_id)?.clone();
        let items = self.items.get(&order_id).cloned().unwrap_or_default();
        Some(OrderDetail { order, items })
    }

    /// Append events. Nothing is appended unless all of them are.
    fn append_events(
        &mut self,
        events: Vec<NewEvent>,
        at: time::OffsetDateTime,
    ) -> Result<Vec<EventLogRecord>, StoreError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        if self.fail_event_appends {
            return Err(StoreError::Injected("event log append"));
        }
        // Same encoding path as the database backend.
        for new in &events {
            new.event.payload()?;
        }
        let mut appended = Vec::with_capacity(events.len());
        for new in events {
            let record = EventLogRecord {
                id: self.events.len() as i64 + 1,
                tenant_id: new.tenant_id,
                store_id: new.store_id,
                event: new.event,
                created_at: at,
            };
            self.events.push(record.clone());
            appended.push(record);
        }
        Ok(appended)
    }

    fn item_id(&mut self) -> i64 {
        self.next_item_id += 1;
        self.next_item_id
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryProcessor {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_store(&self, store: StoreRecord) {
        self.state.lock().await.stores.insert(store.id, store);
    }

    pub async fn insert_buyer(&self, buyer: BuyerRecord) {
        self.state.lock().await.buyers.insert(buyer.id, buyer);
    }

    pub async fn insert_product(&self, product: ProductRecord) {
        self.state.lock().await.products.insert(product.id, product);
    }

    pub async fn insert_inventory(&self, inventory: InventoryRecord) {
        self.state
            .lock()
            .await
            .inventories
            .insert(inventory.product_id, inventory);
    }

    /// Insert an order as-is, bypassing checkout.
    pub async fn insert_order(&self, detail: OrderDetail) {
        let mut state = self.state.lock().await;
        state.items.insert(detail.order.id, detail.items);
        state.orders.insert(detail.order.id, detail.order);
    }

    /// Insert an event log row with an explicit timestamp.
    pub async fn insert_event(&self, new: NewEvent, at: time::OffsetDateTime) {
        let mut state = self.state.lock().await;
        let id = state.events.len() as i64 + 1;
        state.events.push(EventLogRecord {
            id,
            tenant_id: new.tenant_id,
            store_id: new.store_id,
            event: new.event,
            created_at: at,
        });
    }

    /// Make every subsequent event append fail until switched off.
    pub async fn fail_event_appends(&self, fail: bool) {
        self.state.lock().await.fail_event_appends = fail;
    }

    /// Move an order's timestamps `by` into the past.
    pub async fn age_order(&self, order_id: Uuid, by: time::Duration) {
        let mut state = self.state.lock().await;
        if let Some(order) = state.orders.get_mut(&order_id) {
            order.created_at -= by;
            order.last_attempt_at -= by;
            if let Some(paid_at) = order.paid_at.as_mut() {
                *paid_at -= by;
            }
        }
    }

    pub async fn events(&self) -> Vec<EventLogRecord> {
        self.state.lock().await.events.clone()
    }

    pub async fn product(&self, product_id: Uuid) -> Option<ProductRecord> {
        self.state.lock().await.products.get(&product_id).cloned()
    }

    pub async fn inventory(&self, product_id: Uuid) -> Option<InventoryRecord> {
        self.state.lock().await.inventories.get(&product_id).cloned()
    }

    pub async fn store(&self, store_id: Uuid) -> Option<StoreRecord> {
        self.state.lock().await.stores.get(&store_id).cloned()
    }

    pub async fn order(&self, order_id: Uuid) -> Option<OrderDetail> {
        self.state.lock().await.detail(order_id)
    }

    /// Number of pending orders of a buyer in a store.
    pub async fn pending_orders(&self, buyer_id: Uuid, store_id: Uuid) -> usize {
        self.state
            .lock()
            .await
            .orders
            .values()
            .filter(|o| {
                o.buyer_id == buyer_id && o.store_id == store_id && o.status == OrderStatus::Pending
            })
            .count()
    }
}
