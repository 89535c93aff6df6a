//! Rendering of event log entries as dashboard notifications.

use stall_sdk::objects::{ActivityItem, Notification, NotificationIcon};

use crate::entities::OrderStatus;
use crate::entities::event_log::{DomainEvent, EventLogRecord};

fn order_link(order_id: impl std::fmt::Display) -> Option<String> {
    Some(format!("/dashboard/orders/{order_id}"))
}

fn product_link(product_id: impl std::fmt::Display) -> Option<String> {
    Some(format!("/dashboard/inventory/{product_id}"))
}

fn short(id: uuid::Uuid) -> String {
    id.simple().to_string().chars().take(8).collect()
}

fn notification(
    title: &str,
    message: String,
    icon: NotificationIcon,
    link: Option<String>,
) -> Notification {
    Notification {
        title: title.to_owned(),
        message,
        icon,
        link,
    }
}

/// Render an event. Total: every event, known or not, has a rendering.
pub fn render(event: &DomainEvent) -> Notification {
    match event {
        DomainEvent::StockReducedByOrder(e) if e.oversold => notification(
            "Product oversold",
            format!(
                "Order #{} took {} units; stock is now {}",
                short(e.order_id),
                e.quantity,
                e.new_stock
            ),
            NotificationIcon::Warning,
            product_link(e.product_id),
        ),
        DomainEvent::StockReducedByOrder(e) => notification(
            "Stock reduced",
            format!(
                "Order #{} took {} units ({} -> {})",
                short(e.order_id),
                e.quantity,
                e.prev_stock,
                e.new_stock
            ),
            NotificationIcon::Package,
            product_link(e.product_id),
        ),
        DomainEvent::ProductRestocked(e) => notification(
            "Product restocked",
            format!("Added {} units ({} -> {})", e.added, e.prev_quantity, e.new_quantity),
            NotificationIcon::Restock,
            product_link(e.product_id),
        ),
        DomainEvent::StockAdjustedManually(e) => notification(
            "Stock adjusted",
            format!(
                "Stock changed by {} ({} -> {})",
                e.added, e.prev_quantity, e.new_quantity
            ),
            NotificationIcon::Adjustment,
            product_link(e.product_id),
        ),
        DomainEvent::OrderPlaced(e) => notification(
            "New order",
            format!("Order #{} placed for {}", short(e.order_id), e.total_amount),
            NotificationIcon::Package,
            order_link(e.order_id),
        ),
        DomainEvent::PaymentSuccess(e) => notification(
            "Payment received",
            format!("{} received for order #{}", e.amount, short(e.order_id)),
            NotificationIcon::Payment,
            order_link(e.order_id),
        ),
        DomainEvent::OrderStatusChanged(e) => {
            let icon = match e.to {
                OrderStatus::Shipped | OrderStatus::Delivered => NotificationIcon::Truck,
                OrderStatus::Cancelled => NotificationIcon::Cancel,
                OrderStatus::Pending | OrderStatus::Paid => NotificationIcon::Activity,
            };
            notification(
                "Order updated",
                format!("Order #{} moved from {} to {}", short(e.order_id), e.from, e.to),
                icon,
                order_link(e.order_id),
            )
        }
        DomainEvent::OrderCancelled(e) => notification(
            "Order cancelled",
            format!("Order #{} was cancelled ({})", short(e.order_id), e.reason),
            NotificationIcon::Cancel,
            order_link(e.order_id),
        ),
        DomainEvent::CheckoutAbandoned(e) => notification(
            "Checkout abandoned",
            match &e.reason {
                Some(reason) => format!("Order #{} was abandoned: {reason}", short(e.order_id)),
                None => format!("Order #{} was abandoned", short(e.order_id)),
            },
            NotificationIcon::Cart,
            order_link(e.order_id),
        ),
        DomainEvent::SessionStart(_) => notification(
            "New visitor",
            "A shopper started browsing your store".to_owned(),
            NotificationIcon::User,
            None,
        ),
        DomainEvent::ProductView(e) => notification(
            "Product viewed",
            "A shopper is looking at one of your products".to_owned(),
            NotificationIcon::Eye,
            product_link(e.product_id),
        ),
        DomainEvent::AddToCart(e) => notification(
            "Added to cart",
            format!("A shopper added {} units to their cart", e.quantity),
            NotificationIcon::Cart,
            product_link(e.product_id),
        ),
        DomainEvent::CheckoutStart(e) => notification(
            "Checkout started",
            "A shopper started checking out".to_owned(),
            NotificationIcon::Cart,
            e.order_id.and_then(order_link),
        ),
        DomainEvent::Unknown { event_type, .. } => notification(
            "Activity recorded",
            format!("{event_type} was recorded"),
            NotificationIcon::Activity,
            None,
        ),
    }
}

/// Feed entry for an event log row.
pub fn activity_item(record: &EventLogRecord) -> ActivityItem {
    ActivityItem {
        event_id: record.id,
        event_type: record.event.event_type().to_owned(),
        created_at: record.created_at.unix_timestamp(),
        notification: render(&record.event),
    }
}
