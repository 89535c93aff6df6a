//! Dashboard statistics derived from orders and the event log.
//!
//! Every type here is a read model: nothing is written back when these
//! are computed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::inventory::AdjustmentKind;

/// Revenue and order count for one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineBucket {
    pub date: time::Date,
    pub revenue: Decimal,
    pub orders: u32,
}

/// Day buckets for the requested window, oldest first.
///
/// `buckets.len()` always equals `days`; days without paid orders are
/// present with zero values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineStats {
    pub store_id: Uuid,
    pub days: u32,
    pub buckets: Vec<TimelineBucket>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub product_id: Uuid,
    pub name: String,
    pub stock: i32,
    pub low_stock_alert: i32,
}

/// A recent restock or manual adjustment taken from the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryActivity {
    pub product_id: Uuid,
    pub kind: AdjustmentKind,
    pub prev_quantity: i32,
    pub new_quantity: i32,
    pub at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySnapshot {
    pub store_id: Uuid,
    pub low_stock: Vec<StockLevel>,
    pub out_of_stock: Vec<StockLevel>,
    pub recent_activity: Vec<InventoryActivity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    Sessions,
    ProductViews,
    AddToCart,
    CheckoutStarted,
    Purchased,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelStep {
    pub stage: FunnelStage,
    pub count: u64,
}

/// Conversion funnel for a store.
///
/// When the store has no tracked events yet the steps are estimated from
/// the order count and `synthetic` is `true`. Clients must not present
/// synthetic steps as measured data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelStats {
    pub steps: Vec<FunnelStep>,
    pub synthetic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOverview {
    pub store_id: Uuid,
    pub days: u32,
    pub revenue: Decimal,
    pub paid_orders: u64,
    pub average_order_value: Decimal,
    pub top_products: Vec<TopProduct>,
}
