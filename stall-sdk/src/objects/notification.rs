//! Human-readable notifications rendered from event log entries.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationIcon {
    Package,
    Restock,
    Adjustment,
    Payment,
    Cart,
    Eye,
    User,
    Truck,
    Cancel,
    Warning,
    Activity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub icon: NotificationIcon,
    /// Dashboard path the notification points at, if any.
    pub link: Option<String>,
}

/// An entry of the store activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    pub event_id: i64,
    pub event_type: String,
    pub created_at: i64,
    pub notification: Notification,
}
