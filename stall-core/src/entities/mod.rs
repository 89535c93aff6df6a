pub mod event_log;
pub mod order_records;
pub mod products;
pub mod stores;

use stall_sdk::objects::OrderStatus as SdkOrderStatus;

/// Order status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `stall_sdk::objects::OrderStatus`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, serde::Serialize, serde::Deserialize,
)]
#[sqlx(rename_all = "lowercase", type_name = "order_status")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
    Shipped,
    Delivered,
}

impl OrderStatus {
    /// `true` once payment has been confirmed, including the seller's
    /// post-paid states.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        SdkOrderStatus::from(*self).fmt(f)
    }
}

impl From<OrderStatus> for SdkOrderStatus {
    fn from(value: OrderStatus) -> Self {
        match value {
            OrderStatus::Pending => SdkOrderStatus::Pending,
            OrderStatus::Paid => SdkOrderStatus::Paid,
            OrderStatus::Cancelled => SdkOrderStatus::Cancelled,
            OrderStatus::Shipped => SdkOrderStatus::Shipped,
            OrderStatus::Delivered => SdkOrderStatus::Delivered,
        }
    }
}

impl From<SdkOrderStatus> for OrderStatus {
    fn from(value: SdkOrderStatus) -> Self {
        match value {
            SdkOrderStatus::Pending => OrderStatus::Pending,
            SdkOrderStatus::Paid => OrderStatus::Paid,
            SdkOrderStatus::Cancelled => OrderStatus::Cancelled,
            SdkOrderStatus::Shipped => OrderStatus::Shipped,
            SdkOrderStatus::Delivered => OrderStatus::Delivered,
        }
    }
}
