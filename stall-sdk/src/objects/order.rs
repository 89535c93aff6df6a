//! Checkout order request and response types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `stall-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
    Shipped,
    Delivered,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Paid => write!(f, "PAID"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::Shipped => write!(f, "SHIPPED"),
            OrderStatus::Delivered => write!(f, "DELIVERED"),
        }
    }
}

/// One cart line as submitted at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Unit price computed by the storefront. Not recomputed server-side.
    pub price: Decimal,
}

/// Request body for `POST /buyer/orders`.
///
/// Repeated submissions for the same buyer and store update the single
/// live draft order instead of creating new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub store_id: Uuid,
    pub total_amount: Decimal,
    pub items: Vec<OrderItemInput>,
}

/// Request body for the abandonment telemetry endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackAbandonmentRequest {
    pub order_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Request body for seller-driven status changes (shipping, delivery).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Full order state returned by every order-returning endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub tenant_id: Uuid,
    pub store_id: Uuid,
    pub buyer_id: Uuid,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_ref: Option<String>,
    pub retry_count: i32,
    pub abandon_reason: Option<String>,
    /// Unix timestamp of the last checkout attempt.
    pub last_attempt_at: i64,
    /// Unix timestamp of the PAID transition, if any.
    pub paid_at: Option<i64>,
    /// Unix timestamp of when the order was created.
    pub created_at: i64,
    pub items: Vec<OrderItemResponse>,
}
