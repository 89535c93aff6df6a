//! Manual stock adjustment types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for `PUT /seller/stores/{store_id}/products/{product_id}/stock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStockRequest {
    /// The new absolute stock level.
    pub stock: i32,
}

/// How a stock change was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentKind {
    Restock,
    ManualAdjustment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustmentResponse {
    pub product_id: Uuid,
    pub prev_stock: i32,
    pub new_stock: i32,
    pub adjustment: i32,
    pub kind: AdjustmentKind,
    pub last_restocked_at: Option<i64>,
    pub history_len: usize,
}
