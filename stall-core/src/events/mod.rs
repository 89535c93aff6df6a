//! In-process event plumbing.
//!
//! # Event Flow
//!
//! 1. A committed PAID transition emits `OrderNotice::Confirmed` -> `NotificationDispatcher`
//! 2. Every committed event log row is rendered and published on the
//!    `StoreBroadcaster` -> store WebSocket subscribers
//! 3. Every committed write publishes a `stats_updated` hint for its store
//!
//! Notices are ephemeral and carry identifiers only; the dispatcher
//! re-fetches the order before delivering anything.

pub mod broadcast;
pub mod channels;
pub mod types;

pub use broadcast::{StoreBroadcaster, StoreSignal, DEFAULT_BROADCAST_CAPACITY};
pub use channels::{
    order_notice_channel, OrderNoticeReceiver, OrderNoticeSender, DEFAULT_CHANNEL_BUFFER,
};
pub use types::OrderNotice;
