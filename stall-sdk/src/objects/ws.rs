//! WebSocket frames for the store broadcast stream.
//!
//! The `GET /seller/stores/{store_id}/ws` endpoint upgrades to a WebSocket
//! connection and pushes [`BroadcastMessage`] JSON frames for that store
//! only.
//!
//! # Protocol
//!
//! 1. `notification_received` is pushed once per new event log entry.
//! 2. `stats_updated` is a bare invalidation hint. Clients re-fetch the
//!    statistics endpoints instead of receiving figures on the socket.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notification::Notification;

/// Server-to-client WebSocket message.
///
/// ```json
/// {"type":"notification_received","notification":{ ... }}
/// {"type":"stats_updated","storeId":"..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastMessage {
    NotificationReceived { notification: Notification },
    #[serde(rename_all = "camelCase")]
    StatsUpdated { store_id: Uuid },
}
