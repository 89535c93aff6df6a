//! Storefront telemetry accepted from the buyer frontend.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Funnel events a storefront may report.
///
/// Serialized adjacently tagged, matching how the event log stores them:
///
/// ```json
/// {"eventType":"ADD_TO_CART","payload":{"productId":"...","quantity":2}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "eventType",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum TelemetryEvent {
    #[serde(rename_all = "camelCase")]
    SessionStart {
        #[serde(default)]
        session_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ProductView { product_id: Uuid },
    #[serde(rename_all = "camelCase")]
    AddToCart { product_id: Uuid, quantity: i32 },
    #[serde(rename_all = "camelCase")]
    CheckoutStart {
        #[serde(default)]
        order_id: Option<Uuid>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEventRequest {
    pub store_id: Uuid,
    pub event: TelemetryEvent,
}
