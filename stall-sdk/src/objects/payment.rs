//! Payment verification types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::OrderResponse;

/// Request body for `POST /payments/verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub store_id: Uuid,
    /// Opaque transaction reference issued by the payment provider.
    pub reference: String,
    #[serde(default)]
    pub order_id: Option<Uuid>,
}

/// Response of a successful verification.
///
/// `provider` is the provider's verification document, passed through
/// untouched so the frontend can show the provider's own status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub verified: bool,
    pub order: Option<OrderResponse>,
    pub provider: serde_json::Value,
}

/// Request body for storing a store's payment provider secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPaymentSecretRequest {
    pub secret: String,
}

/// Payload posted to the notification webhook once an order is paid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmation {
    /// Always `"order_confirmed"`.
    pub event: String,
    pub store_name: String,
    pub buyer_email: Option<String>,
    pub order: OrderResponse,
    pub timestamp: i64,
}
