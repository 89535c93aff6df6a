pub mod inventory;
pub mod notification;
pub mod order;
pub mod payment;
pub mod stats;
pub mod telemetry;
pub mod ws;

pub use inventory::{AdjustStockRequest, AdjustmentKind, StockAdjustmentResponse};
pub use notification::{ActivityItem, Notification, NotificationIcon};
pub use order::{
    CreateOrderRequest, OrderItemInput, OrderItemResponse, OrderResponse, OrderStatus,
    TrackAbandonmentRequest, UpdateOrderStatusRequest,
};
pub use payment::{OrderConfirmation, SetPaymentSecretRequest, VerifyPaymentRequest, VerifyPaymentResponse};
pub use stats::{
    FunnelStage, FunnelStats, FunnelStep, InventoryActivity, InventorySnapshot, StockLevel,
    StoreOverview, TimelineBucket, TimelineStats, TopProduct,
};
pub use telemetry::{TelemetryEvent, TrackEventRequest};
pub use ws::BroadcastMessage;
