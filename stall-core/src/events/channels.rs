//! Event channel factories and handles.

use super::types::OrderNotice;
use tokio::sync::mpsc;

/// Default buffer size for event channels.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for OrderNotice events.
pub type OrderNoticeSender = mpsc::Sender<OrderNotice>;
/// Receiver handle for OrderNotice events.
pub type OrderNoticeReceiver = mpsc::Receiver<OrderNotice>;

/// Create a new OrderNotice channel.
///
/// Services hold clones of the sender; the notification dispatcher owns
/// the receiver.
pub fn order_notice_channel() -> (OrderNoticeSender, OrderNoticeReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
