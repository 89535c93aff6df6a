//! Order lifecycle: checkout dedup, the status state machine, abandonment
//! tracking and stale-order cancellation.
//!
//! The state machine itself ([`plan_transition`]) is pure. The persistence
//! backends call it while holding the order row lock, so the decision and
//! its side effects commit together.

use std::collections::HashSet;

use stall_sdk::objects::CreateOrderRequest;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::OrderStatus;
use crate::entities::event_log::{
    CheckoutAbandoned, DomainEvent, EventLogRecord, OrderCancelled, OrderStatusChanged,
    PaymentSucceeded,
};
use crate::entities::order_records::{
    AbandonOutcome, ApplyOrderTransition, CancelStalePendingOrders, CancelledOrder, GetOrderById,
    NewOrderItem, OrderDetail, OrderRecord, RecordAbandonment, TransitionOutcome,
    UpsertPendingOrder,
};
use crate::entities::products::GetStoreProducts;
use crate::entities::stores::{BuyerRecord, GetBuyerById, GetStoreById, StoreRecord};
use crate::error::{CommerceError, StoreError};
use crate::events::{OrderNotice, OrderNoticeSender, StoreBroadcaster};
use crate::framework::CommerceStore;

/// Cancellation reason recorded by the stale-order sweeper.
pub const STALE_REASON: &str = "stale";
/// Cancellation reason recorded for seller-initiated cancellations.
pub const SELLER_REASON: &str = "cancelled_by_seller";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Write the new status and its side effects.
    Apply,
    /// The order is already where the caller wants it.
    Noop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionRejection {
    #[error("order is cancelled and can no longer be paid")]
    OrderCancelled,
    #[error("illegal order transition from {from} to {to}")]
    Illegal { from: OrderStatus, to: OrderStatus },
    #[error("payment reference already settled another order")]
    ReferenceInUse,
}

/// Decide what moving an order from `from` to `to` means.
///
/// Requesting PAID on an order that is already paid, shipped or delivered
/// is a no-op, which is what makes repeated payment confirmations inert.
pub fn plan_transition(
    from: OrderStatus,
    to: OrderStatus,
) -> Result<TransitionPlan, TransitionRejection> {
    use OrderStatus::*;

    if from == to {
        return Ok(TransitionPlan::Noop);
    }
    match (from, to) {
        (Pending, Paid) | (Pending, Cancelled) | (Paid, Shipped) | (Paid, Delivered)
        | (Shipped, Delivered) => Ok(TransitionPlan::Apply),
        (Shipped | Delivered, Paid) => Ok(TransitionPlan::Noop),
        (Cancelled, Paid) => Err(TransitionRejection::OrderCancelled),
        (from, to) => Err(TransitionRejection::Illegal { from, to }),
    }
}

pub fn cancellation_event(order_id: Uuid, reason: &str) -> DomainEvent {
    DomainEvent::OrderCancelled(OrderCancelled {
        order_id,
        reason: reason.to_owned(),
    })
}

pub fn abandonment_event(order_id: Uuid, reason: Option<String>) -> DomainEvent {
    DomainEvent::CheckoutAbandoned(CheckoutAbandoned { order_id, reason })
}

/// Events other than stock reductions appended when `order` moves to
/// `target`.
pub fn transition_events(
    order: &OrderRecord,
    target: OrderStatus,
    payment_ref: Option<&str>,
    reason: Option<&str>,
) -> Vec<DomainEvent> {
    match target {
        OrderStatus::Paid => payment_ref
            .map(|reference| {
                DomainEvent::PaymentSuccess(PaymentSucceeded {
                    order_id: order.id,
                    reference: reference.to_owned(),
                    amount: order.total_amount,
                })
            })
            .into_iter()
            .collect(),
        OrderStatus::Cancelled => vec![cancellation_event(
            order.id,
            reason.unwrap_or(SELLER_REASON),
        )],
        OrderStatus::Shipped | OrderStatus::Delivered => {
            vec![DomainEvent::OrderStatusChanged(OrderStatusChanged {
                order_id: order.id,
                from: order.status,
                to: target,
            })]
        }
        OrderStatus::Pending => Vec::new(),
    }
}

/// Reject carts the engine must not persist.
pub fn validate_checkout(request: &CreateOrderRequest) -> Result<(), CommerceError> {
    if request.items.is_empty() {
        return Err(CommerceError::validation("order must contain at least one item"));
    }
    if request.total_amount.is_sign_negative() {
        return Err(CommerceError::validation("total amount cannot be negative"));
    }
    for item in &request.items {
        if item.quantity <= 0 {
            return Err(CommerceError::validation(format!(
                "quantity of product {} must be positive",
                item.product_id
            )));
        }
        if item.price.is_sign_negative() {
            return Err(CommerceError::validation(format!(
                "price of product {} cannot be negative",
                item.product_id
            )));
        }
    }
    Ok(())
}

/// An order with the store and buyer it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderView {
    pub order: OrderDetail,
    pub store: StoreRecord,
    pub buyer: Option<BuyerRecord>,
    /// `false` when the call found the order already in the requested state.
    pub changed: bool,
    /// Event log rows appended by the call.
    pub events: Vec<EventLogRecord>,
}

#[derive(Clone)]
pub struct OrderLifecycle<S> {
    store: S,
    notices: OrderNoticeSender,
    broadcaster: StoreBroadcaster,
}

impl<S: CommerceStore> OrderLifecycle<S> {
    pub fn new(store: S, notices: OrderNoticeSender, broadcaster: StoreBroadcaster) -> Self {
        Self {
            store,
            notices,
            broadcaster,
        }
    }

    async fn load_store(&self, store_id: Uuid) -> Result<StoreRecord, CommerceError> {
        self.store
            .process(GetStoreById { store_id })
            .await?
            .ok_or_else(|| CommerceError::not_found("store", store_id))
    }

    async fn view(
        &self,
        order: OrderDetail,
        changed: bool,
        events: Vec<EventLogRecord>,
    ) -> Result<OrderView, CommerceError> {
        let store = self.load_store(order.order.store_id).await?;
        let buyer = self
            .store
            .process(GetBuyerById {
                buyer_id: order.order.buyer_id,
            })
            .await?;
        Ok(OrderView {
            order,
            store,
            buyer,
            changed,
            events,
        })
    }

    /// Turn a cart into the buyer's single pending order for the store.
    ///
    /// A repeated checkout replaces the items and total of the pending order
    /// in place and increments its retry count.
    pub async fn create(
        &self,
        buyer_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<OrderView, CommerceError> {
        validate_checkout(&request)?;

        let store = self.load_store(request.store_id).await?;
        let buyer = self
            .store
            .process(GetBuyerById { buyer_id })
            .await?
            .filter(|buyer| buyer.tenant_id == store.tenant_id)
            .ok_or_else(|| CommerceError::not_found("buyer", buyer_id))?;

        let mut product_ids: Vec<Uuid> = request.items.iter().map(|i| i.product_id).collect();
        product_ids.sort();
        product_ids.dedup();
        let found: HashSet<Uuid> = self
            .store
            .process(GetStoreProducts {
                store_id: store.id,
                product_ids: product_ids.clone(),
            })
            .await?
            .into_iter()
            .map(|product| product.id)
            .collect();
        if let Some(missing) = product_ids.iter().find(|id| !found.contains(id)) {
            return Err(CommerceError::not_found("product", *missing));
        }

        let cmd = UpsertPendingOrder {
            tenant_id: store.tenant_id,
            store_id: store.id,
            buyer_id,
            total_amount: request.total_amount,
            items: request
                .items
                .iter()
                .map(|item| NewOrderItem {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: item.price,
                })
                .collect(),
        };

        let upsert = match self.store.process(cmd.clone()).await {
            Err(StoreError::Conflict(reason)) => {
                warn!(
                    buyer_id = %buyer_id,
                    store_id = %store.id,
                    reason = %reason,
                    "Pending order insert collided, retrying once"
                );
                self.store.process(cmd).await.map_err(|err| match err {
                    StoreError::Conflict(reason) => CommerceError::Conflict(reason),
                    other => other.into(),
                })?
            }
            other => other?,
        };

        info!(
            order_id = %upsert.order.order.id,
            buyer_id = %buyer_id,
            store_id = %store.id,
            created = upsert.created,
            retry_count = upsert.order.order.retry_count,
            superseded = upsert.superseded.len(),
            "Pending order saved"
        );
        self.broadcaster.stats_updated(store.id);

        Ok(OrderView {
            order: upsert.order,
            store,
            buyer: Some(buyer),
            changed: true,
            events: Vec::new(),
        })
    }

    /// Fetch an order on behalf of the buyer who owns it.
    pub async fn get_for_buyer(
        &self,
        buyer_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderView, CommerceError> {
        let order = self
            .store
            .process(GetOrderById { order_id })
            .await?
            .filter(|detail| detail.order.buyer_id == buyer_id)
            .ok_or_else(|| CommerceError::not_found("order", order_id))?;
        self.view(order, false, Vec::new()).await
    }

    /// Seller-driven status change (shipping, delivery, cancellation of a
    /// pending order). PAID is only reachable through payment verification.
    pub async fn update_status(
        &self,
        store_id: Uuid,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<OrderView, CommerceError> {
        if matches!(target, OrderStatus::Paid | OrderStatus::Pending) {
            return Err(CommerceError::validation(format!(
                "orders cannot be set to {target} manually"
            )));
        }
        self.store
            .process(GetOrderById { order_id })
            .await?
            .filter(|detail| detail.order.store_id == store_id)
            .ok_or_else(|| CommerceError::not_found("order", order_id))?;

        self.transition(ApplyOrderTransition {
            order_id,
            target,
            payment_ref: None,
            reason: Some(SELLER_REASON.to_owned()),
        })
        .await
    }

    /// Mark an order PAID after its payment was verified.
    pub(crate) async fn confirm_payment(
        &self,
        order_id: Uuid,
        reference: &str,
    ) -> Result<OrderView, CommerceError> {
        self.transition(ApplyOrderTransition {
            order_id,
            target: OrderStatus::Paid,
            payment_ref: Some(reference.to_owned()),
            reason: None,
        })
        .await
    }

    async fn transition(&self, cmd: ApplyOrderTransition) -> Result<OrderView, CommerceError> {
        let order_id = cmd.order_id;
        let target = cmd.target;
        let outcome = self
            .store
            .process(cmd)
            .await?
            .ok_or_else(|| CommerceError::not_found("order", order_id))?;

        match outcome {
            TransitionOutcome::Rejected {
                rejection:
                    rejection @ (TransitionRejection::OrderCancelled
                    | TransitionRejection::ReferenceInUse),
                ..
            } => Err(CommerceError::Conflict(rejection.to_string())),
            TransitionOutcome::Rejected {
                rejection: rejection @ TransitionRejection::Illegal { .. },
                ..
            } => Err(CommerceError::Validation(rejection.to_string())),
            TransitionOutcome::Unchanged { order } => {
                info!(
                    order_id = %order_id,
                    status = %order.order.status,
                    requested = %target,
                    "Order already in requested state"
                );
                self.view(order, false, Vec::new()).await
            }
            TransitionOutcome::Applied {
                previous,
                order,
                events,
            } => {
                info!(
                    order_id = %order_id,
                    from = %previous,
                    to = %order.order.status,
                    events = events.len(),
                    "Order transitioned"
                );
                self.broadcaster.publish_events(&events);
                self.broadcaster.stats_updated(order.order.store_id);
                if order.order.status == OrderStatus::Paid {
                    if let Err(err) = self.notices.try_send(OrderNotice::Confirmed { order_id }) {
                        warn!(order_id = %order_id, error = %err, "Failed to enqueue order confirmation");
                    }
                }
                self.view(order, true, events).await
            }
        }
    }

    /// Record that the buyer left checkout. Only pending orders of the
    /// calling buyer are touched.
    pub async fn track_abandonment(
        &self,
        buyer_id: Uuid,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<AbandonOutcome, CommerceError> {
        self.store
            .process(GetOrderById { order_id })
            .await?
            .filter(|detail| detail.order.buyer_id == buyer_id)
            .ok_or_else(|| CommerceError::not_found("order", order_id))?;

        let outcome = self
            .store
            .process(RecordAbandonment { order_id, reason })
            .await?;
        match &outcome {
            AbandonOutcome::Recorded(event) => {
                info!(order_id = %order_id, "Checkout abandonment recorded");
                self.broadcaster.publish_events(std::slice::from_ref(event));
                self.broadcaster.stats_updated(event.store_id);
            }
            AbandonOutcome::NotPending(status) => {
                info!(order_id = %order_id, status = %status, "Ignoring abandonment of non-pending order");
            }
            AbandonOutcome::NotFound => {}
        }
        Ok(outcome)
    }

    /// Cancel pending orders whose last checkout attempt is older than `ttl`.
    pub async fn cancel_stale(
        &self,
        ttl: std::time::Duration,
        limit: i64,
    ) -> Result<Vec<CancelledOrder>, CommerceError> {
        let older_than = time::OffsetDateTime::now_utc() - ttl;
        let cancelled = self
            .store
            .process(CancelStalePendingOrders { older_than, limit })
            .await?;

        let mut stores = HashSet::new();
        for entry in &cancelled {
            info!(order_id = %entry.order.id, store_id = %entry.order.store_id, "Cancelled stale pending order");
            self.broadcaster
                .publish_events(std::slice::from_ref(&entry.event));
            stores.insert(entry.order.store_id);
        }
        for store_id in stores {
            self.broadcaster.stats_updated(store_id);
        }
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::event_log::{
        CHECKOUT_ABANDONED, ORDER_CANCELLED, ORDER_STATUS_CHANGED, PAYMENT_SUCCESS,
        STOCK_REDUCED_BY_ORDER,
    };
    use crate::memory::MemoryProcessor;
    use crate::testing::{Fixture, cart};
    use rust_decimal::Decimal;
    use stall_sdk::objects::BroadcastMessage;

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        assert_eq!(plan_transition(Pending, Paid), Ok(TransitionPlan::Apply));
        assert_eq!(plan_transition(Pending, Cancelled), Ok(TransitionPlan::Apply));
        assert_eq!(plan_transition(Paid, Shipped), Ok(TransitionPlan::Apply));
        assert_eq!(plan_transition(Shipped, Delivered), Ok(TransitionPlan::Apply));
        assert_eq!(plan_transition(Paid, Paid), Ok(TransitionPlan::Noop));
        assert_eq!(plan_transition(Delivered, Paid), Ok(TransitionPlan::Noop));
        assert_eq!(
            plan_transition(Cancelled, Paid),
            Err(TransitionRejection::OrderCancelled)
        );
        assert_eq!(
            plan_transition(Paid, Pending),
            Err(TransitionRejection::Illegal {
                from: Paid,
                to: Pending
            })
        );
        assert!(plan_transition(Paid, Cancelled).is_err());
        assert!(plan_transition(Delivered, Shipped).is_err());
    }

    #[test]
    fn test_checkout_validation() {
        let product = Uuid::new_v4();
        let store = Uuid::new_v4();
        assert!(validate_checkout(&cart(store, 100, &[(product, 1, 100)])).is_ok());
        assert!(validate_checkout(&cart(store, 0, &[])).is_err());
        assert!(validate_checkout(&cart(store, 100, &[(product, 0, 100)])).is_err());
        assert!(validate_checkout(&cart(store, 100, &[(product, 1, -1)])).is_err());
        assert!(validate_checkout(&cart(store, -1, &[(product, 1, 100)])).is_err());
    }

    #[tokio::test]
    async fn test_repeat_checkout_updates_pending_order_in_place() {
        let fx = Fixture::new().await;
        let a = fx.product_priced(500, 10).await;
        let b = fx.product_priced(300, 10).await;
        let lifecycle = fx.lifecycle();

        let first = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 1000, &[(a, 2, 500)]))
            .await
            .unwrap();
        assert_eq!(first.order.order.status, OrderStatus::Pending);
        assert_eq!(first.order.order.total_amount, Decimal::new(1000, 0));
        assert_eq!(first.order.order.retry_count, 0);

        let second = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 800, &[(a, 1, 500), (b, 1, 300)]))
            .await
            .unwrap();
        assert_eq!(second.order.order.id, first.order.order.id);
        assert_eq!(second.order.order.total_amount, Decimal::new(800, 0));
        assert_eq!(second.order.order.retry_count, 1);
        assert_eq!(second.order.items.len(), 2);

        assert_eq!(fx.memory.pending_orders(fx.buyer_id, fx.store_id).await, 1);
        // Checkout never touches stock or the event log.
        assert_eq!(fx.memory.product(a).await.map(|p| p.stock), Some(10));
        assert!(fx.memory.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_leave_one_pending_order() {
        let fx = Fixture::new().await;
        let a = fx.product_priced(500, 10).await;
        let lifecycle = fx.lifecycle();

        let mut handles = Vec::new();
        for quantity in 1..=8 {
            let lifecycle = lifecycle.clone();
            let request = cart(fx.store_id, 500 * quantity as i64, &[(a, quantity, 500)]);
            let buyer = fx.buyer_id;
            handles.push(tokio::spawn(async move { lifecycle.create(buyer, request).await }));
        }
        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap().unwrap().order.order.id);
        }

        assert_eq!(ids.len(), 1);
        assert_eq!(fx.memory.pending_orders(fx.buyer_id, fx.store_id).await, 1);
        let order_id = ids.into_iter().next().unwrap();
        let stored = fx.memory.order(order_id).await.unwrap();
        assert_eq!(stored.order.retry_count, 7);
        assert_eq!(stored.items.len(), 1);
        assert_eq!(
            stored.order.total_amount,
            Decimal::from(500 * stored.items[0].quantity)
        );
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_references() {
        let fx = Fixture::new().await;
        let a = fx.product_priced(500, 10).await;
        let lifecycle = fx.lifecycle();

        let err = lifecycle
            .create(Uuid::new_v4(), cart(fx.store_id, 500, &[(a, 1, 500)]))
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::NotFound { entity: "buyer", .. }));

        let err = lifecycle
            .create(fx.buyer_id, cart(Uuid::new_v4(), 500, &[(a, 1, 500)]))
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::NotFound { entity: "store", .. }));

        let err = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 500, &[(Uuid::new_v4(), 1, 500)]))
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::NotFound { entity: "product", .. }));
    }

    #[tokio::test]
    async fn test_double_payment_decrements_once() {
        let mut fx = Fixture::new().await;
        let a = fx.product_priced(500, 10).await;
        let b = fx.product_priced(300, 5).await;
        let lifecycle = fx.lifecycle();
        let created = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 1300, &[(a, 2, 500), (b, 1, 300)]))
            .await
            .unwrap();
        let order_id = created.order.order.id;

        let paid = lifecycle.confirm_payment(order_id, "ref_1").await.unwrap();
        assert!(paid.changed);
        assert_eq!(paid.order.order.status, OrderStatus::Paid);
        assert_eq!(paid.order.order.payment_ref.as_deref(), Some("ref_1"));
        assert!(paid.order.order.paid_at.is_some());

        let again = lifecycle.confirm_payment(order_id, "ref_1").await.unwrap();
        assert!(!again.changed);
        assert!(again.events.is_empty());

        assert_eq!(fx.memory.product(a).await.map(|p| p.stock), Some(8));
        assert_eq!(fx.memory.product(b).await.map(|p| p.stock), Some(4));

        let events = fx.memory.events().await;
        let reductions: Vec<_> = events
            .iter()
            .filter(|e| e.event.event_type() == STOCK_REDUCED_BY_ORDER)
            .collect();
        assert_eq!(reductions.len(), 2);
        for record in reductions {
            let DomainEvent::StockReducedByOrder(payload) = &record.event else {
                panic!("unexpected event {:?}", record.event);
            };
            assert_eq!(payload.order_id, order_id);
            assert_eq!(payload.new_stock, payload.prev_stock - payload.quantity);
        }
        assert_eq!(
            events
                .iter()
                .filter(|e| e.event.event_type() == PAYMENT_SUCCESS)
                .count(),
            1
        );

        assert_eq!(
            fx.notices_rx.try_recv().ok(),
            Some(OrderNotice::Confirmed { order_id })
        );
        assert!(fx.notices_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_event_append_rolls_back_payment() {
        let fx = Fixture::new().await;
        let a = fx.product_priced(500, 10).await;
        let lifecycle = fx.lifecycle();
        let created = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 500, &[(a, 1, 500)]))
            .await
            .unwrap();
        let order_id = created.order.order.id;

        fx.memory.fail_event_appends(true).await;
        let err = lifecycle.confirm_payment(order_id, "ref_1").await.unwrap_err();
        assert!(matches!(err, CommerceError::Store(StoreError::Injected(_))));

        let stored = fx.memory.order(order_id).await.unwrap();
        assert_eq!(stored.order.status, OrderStatus::Pending);
        assert!(stored.order.payment_ref.is_none());
        assert_eq!(fx.memory.product(a).await.map(|p| p.stock), Some(10));
        assert!(fx.memory.events().await.is_empty());

        fx.memory.fail_event_appends(false).await;
        let paid = lifecycle.confirm_payment(order_id, "ref_1").await.unwrap();
        assert_eq!(paid.order.order.status, OrderStatus::Paid);
        assert_eq!(fx.memory.product(a).await.map(|p| p.stock), Some(9));
    }

    #[tokio::test]
    async fn test_paying_cancelled_order_conflicts() {
        let fx = Fixture::new().await;
        let a = fx.product_priced(500, 10).await;
        let lifecycle = fx.lifecycle();
        let created = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 500, &[(a, 1, 500)]))
            .await
            .unwrap();
        let order_id = created.order.order.id;

        let cancelled = lifecycle
            .update_status(fx.store_id, order_id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.order.order.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.events.len(), 1);
        assert_eq!(cancelled.events[0].event.event_type(), ORDER_CANCELLED);

        let err = lifecycle.confirm_payment(order_id, "ref_1").await.unwrap_err();
        assert!(matches!(err, CommerceError::Conflict(_)));
        assert_eq!(fx.memory.product(a).await.map(|p| p.stock), Some(10));
    }

    #[tokio::test]
    async fn test_seller_fulfilment_transitions() {
        let fx = Fixture::new().await;
        let a = fx.product_priced(500, 10).await;
        let lifecycle = fx.lifecycle();
        let order_id = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 500, &[(a, 1, 500)]))
            .await
            .unwrap()
            .order
            .order
            .id;

        let err = lifecycle
            .update_status(fx.store_id, order_id, OrderStatus::Shipped)
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::Validation(_)));

        let err = lifecycle
            .update_status(fx.store_id, order_id, OrderStatus::Paid)
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::Validation(_)));

        lifecycle.confirm_payment(order_id, "ref_1").await.unwrap();
        let shipped = lifecycle
            .update_status(fx.store_id, order_id, OrderStatus::Shipped)
            .await
            .unwrap();
        assert_eq!(shipped.order.order.status, OrderStatus::Shipped);
        assert_eq!(shipped.events[0].event.event_type(), ORDER_STATUS_CHANGED);

        let err = lifecycle
            .update_status(Uuid::new_v4(), order_id, OrderStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::NotFound { entity: "order", .. }));

        let delivered = lifecycle
            .update_status(fx.store_id, order_id, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(delivered.order.order.status, OrderStatus::Delivered);

        // A late payment confirmation is inert.
        let replay = lifecycle.confirm_payment(order_id, "ref_1").await.unwrap();
        assert!(!replay.changed);
        assert_eq!(replay.order.order.status, OrderStatus::Delivered);
        assert_eq!(fx.memory.product(a).await.map(|p| p.stock), Some(9));
    }

    #[tokio::test]
    async fn test_abandonment_is_recorded_on_pending_orders_only() {
        let fx = Fixture::new().await;
        let a = fx.product_priced(500, 10).await;
        let lifecycle = fx.lifecycle();
        let order_id = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 500, &[(a, 1, 500)]))
            .await
            .unwrap()
            .order
            .order
            .id;

        let outcome = lifecycle
            .track_abandonment(fx.buyer_id, order_id, Some("shipping_cost".into()))
            .await
            .unwrap();
        let AbandonOutcome::Recorded(event) = outcome else {
            panic!("expected abandonment to be recorded, got {outcome:?}");
        };
        assert_eq!(event.event.event_type(), CHECKOUT_ABANDONED);
        let stored = fx.memory.order(order_id).await.unwrap();
        assert_eq!(stored.order.status, OrderStatus::Pending);
        assert_eq!(stored.order.abandon_reason.as_deref(), Some("shipping_cost"));

        let err = lifecycle
            .track_abandonment(Uuid::new_v4(), order_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::NotFound { .. }));

        lifecycle.confirm_payment(order_id, "ref_1").await.unwrap();
        let outcome = lifecycle
            .track_abandonment(fx.buyer_id, order_id, None)
            .await
            .unwrap();
        assert_eq!(outcome, AbandonOutcome::NotPending(OrderStatus::Paid));
    }

    #[tokio::test]
    async fn test_stale_pending_orders_are_cancelled() {
        let fx = Fixture::new().await;
        let a = fx.product_priced(500, 10).await;
        let lifecycle = fx.lifecycle();
        let order_id = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 500, &[(a, 1, 500)]))
            .await
            .unwrap()
            .order
            .order
            .id;

        let kept = lifecycle
            .cancel_stale(std::time::Duration::from_secs(3600), 100)
            .await
            .unwrap();
        assert!(kept.is_empty());

        fx.memory
            .age_order(order_id, time::Duration::hours(2))
            .await;
        let cancelled = lifecycle
            .cancel_stale(std::time::Duration::from_secs(3600), 100)
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].order.id, order_id);
        assert_eq!(cancelled[0].order.status, OrderStatus::Cancelled);
        let DomainEvent::OrderCancelled(payload) = &cancelled[0].event.event else {
            panic!("unexpected event {:?}", cancelled[0].event.event);
        };
        assert_eq!(payload.reason, STALE_REASON);

        // A new checkout after cancellation starts a fresh order.
        let next = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 500, &[(a, 1, 500)]))
            .await
            .unwrap();
        assert_ne!(next.order.order.id, order_id);
        assert_eq!(next.order.order.retry_count, 0);
    }

    #[tokio::test]
    async fn test_applied_transition_is_broadcast() {
        let fx = Fixture::new().await;
        let a = fx.product_priced(500, 10).await;
        let lifecycle = fx.lifecycle();
        let order_id = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 500, &[(a, 1, 500)]))
            .await
            .unwrap()
            .order
            .order
            .id;

        let mut rx = fx.broadcaster.subscribe();
        lifecycle.confirm_payment(order_id, "ref_1").await.unwrap();

        let mut notifications = 0;
        let mut stats = 0;
        while let Ok(signal) = rx.try_recv() {
            assert_eq!(signal.store_id, fx.store_id);
            match signal.message {
                BroadcastMessage::NotificationReceived { .. } => notifications += 1,
                BroadcastMessage::StatsUpdated { .. } => stats += 1,
            }
        }
        // One stock reduction plus the payment.
        assert_eq!(notifications, 2);
        assert_eq!(stats, 1);
    }

    #[tokio::test]
    async fn test_full_notice_channel_does_not_fail_payment() {
        let fx = Fixture::new().await;
        let a = fx.product_priced(500, 10).await;
        let (notices, _rx) = tokio::sync::mpsc::channel(1);
        notices
            .try_send(OrderNotice::Confirmed {
                order_id: Uuid::nil(),
            })
            .unwrap();
        let lifecycle =
            OrderLifecycle::<MemoryProcessor>::new(fx.memory.clone(), notices, fx.broadcaster.clone());
        let order_id = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 500, &[(a, 1, 500)]))
            .await
            .unwrap()
            .order
            .order
            .id;

        let paid = lifecycle.confirm_payment(order_id, "ref_1").await.unwrap();
        assert_eq!(paid.order.order.status, OrderStatus::Paid);
    }
}
