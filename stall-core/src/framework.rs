use kanau::processor::Processor;
use sqlx::PgPool;

use crate::entities::event_log::{
    AppendEvent, CountEventsByType, EventLogRecord, EventTypeCount, ListRecentEvents,
};
use crate::entities::order_records::{
    AbandonOutcome, ApplyOrderTransition, CancelStalePendingOrders, CancelledOrder, CountOrders,
    GetOrderById, ListSettledOrders, ListTopProducts, OrderDetail, OrderRecord,
    PendingOrderUpsert, RecordAbandonment, TopProductRow, TransitionOutcome, UpsertPendingOrder,
};
use crate::entities::products::{
    AdjustProductStock, GetInventory, GetStoreProducts, InventoryRecord, ListStoreStock,
    ProductRecord, StockAdjustmentOutcome, StockLevelRow,
};
use crate::entities::stores::{
    BuyerRecord, GetBuyerById, GetStoreById, SetStorePaymentSecret, StoreRecord,
};
use crate::error::StoreError;

/// PostgreSQL-backed persistence.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Every persistence operation the engine needs.
///
/// Implemented by [`DatabaseProcessor`] and by
/// [`MemoryProcessor`](crate::memory::MemoryProcessor).
pub trait CommerceStore:
    Processor<GetStoreById, Output = Option<StoreRecord>, Error = StoreError>
    + Processor<GetBuyerById, Output = Option<BuyerRecord>, Error = StoreError>
    + Processor<SetStorePaymentSecret, Output = bool, Error = StoreError>
    + Processor<GetStoreProducts, Output = Vec<ProductRecord>, Error = StoreError>
    + Processor<AdjustProductStock, Output = Option<StockAdjustmentOutcome>, Error = StoreError>
    + Processor<ListStoreStock, Output = Vec<StockLevelRow>, Error = StoreError>
    + Processor<GetInventory, Output = Option<InventoryRecord>, Error = StoreError>
    + Processor<GetOrderById, Output = Option<OrderDetail>, Error = StoreError>
    + Processor<UpsertPendingOrder, Output = PendingOrderUpsert, Error = StoreError>
    + Processor<ApplyOrderTransition, Output = Option<TransitionOutcome>, Error = StoreError>
    + Processor<RecordAbandonment, Output = AbandonOutcome, Error = StoreError>
    + Processor<CancelStalePendingOrders, Output = Vec<CancelledOrder>, Error = StoreError>
    + Processor<ListSettledOrders, Output = Vec<OrderRecord>, Error = StoreError>
    + Processor<CountOrders, Output = i64, Error = StoreError>
    + Processor<ListTopProducts, Output = Vec<TopProductRow>, Error = StoreError>
    + Processor<AppendEvent, Output = EventLogRecord, Error = StoreError>
    + Processor<ListRecentEvents, Output = Vec<EventLogRecord>, Error = StoreError>
    + Processor<CountEventsByType, Output = Vec<EventTypeCount>, Error = StoreError>
    + Clone
    + Send
    + Sync
    + 'static
{
}

impl<T> CommerceStore for T where
    T: Processor<GetStoreById, Output = Option<StoreRecord>, Error = StoreError>
        + Processor<GetBuyerById, Output = Option<BuyerRecord>, Error = StoreError>
        + Processor<SetStorePaymentSecret, Output = bool, Error = StoreError>
        + Processor<GetStoreProducts, Output = Vec<ProductRecord>, Error = StoreError>
        + Processor<AdjustProductStock, Output = Option<StockAdjustmentOutcome>, Error = StoreError>
        + Processor<ListStoreStock, Output = Vec<StockLevelRow>, Error = StoreError>
        + Processor<GetInventory, Output = Option<InventoryRecord>, Error = StoreError>
        + Processor<GetOrderById, Output = Option<OrderDetail>, Error = StoreError>
        + Processor<UpsertPendingOrder, Output = PendingOrderUpsert, Error = StoreError>
        + Processor<ApplyOrderTransition, Output = Option<TransitionOutcome>, Error = StoreError>
        + Processor<RecordAbandonment, Output = AbandonOutcome, Error = StoreError>
        + Processor<CancelStalePendingOrders, Output = Vec<CancelledOrder>, Error = StoreError>
        + Processor<ListSettledOrders, Output = Vec<OrderRecord>, Error = StoreError>
        + Processor<CountOrders, Output = i64, Error = StoreError>
        + Processor<ListTopProducts, Output = Vec<TopProductRow>, Error = StoreError>
        + Processor<AppendEvent, Output = EventLogRecord, Error = StoreError>
        + Processor<ListRecentEvents, Output = Vec<EventLogRecord>, Error = StoreError>
        + Processor<CountEventsByType, Output = Vec<EventTypeCount>, Error = StoreError>
        + Clone
        + Send
        + Sync
        + 'static
{
}
