use std::collections::{BTreeMap, HashMap};

use kanau::processor::Processor;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::MemoryProcessor;
use crate::entities::OrderStatus;
use crate::entities::event_log::{DomainEvent, NewEvent};
use crate::entities::order_records::{
    AbandonOutcome, ApplyOrderTransition, CancelStalePendingOrders, CancelledOrder, CountOrders,
    GetOrderById, ListSettledOrders, ListTopProducts, OrderDetail, OrderItemRecord, OrderRecord,
    PendingOrderUpsert, RecordAbandonment, TopProductRow, TransitionOutcome, UpsertPendingOrder,
};
use crate::error::StoreError;
use crate::inventory;
use crate::lifecycle::{self, TransitionPlan, TransitionRejection};

impl Processor<GetOrderById> for MemoryProcessor {
    type Output = Option<OrderDetail>;
    type Error = StoreError;
    async fn process(&self, query: GetOrderById) -> Result<Option<OrderDetail>, StoreError> {
        Ok(self.state.lock().await.detail(query.order_id))
    }
}

impl Processor<UpsertPendingOrder> for MemoryProcessor {
    type Output = PendingOrderUpsert;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "MEM:UpsertPendingOrder")]
    async fn process(&self, cmd: UpsertPendingOrder) -> Result<PendingOrderUpsert, StoreError> {
        let mut state = self.state.lock().await;
        let now = time::OffsetDateTime::now_utc();

        let mut pending: Vec<&OrderRecord> = state
            .orders
            .values()
            .filter(|order| {
                order.buyer_id == cmd.buyer_id
                    && order.store_id == cmd.store_id
                    && order.status == OrderStatus::Pending
            })
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let current = pending.first().map(|order| (*order).clone());
        let superseded: Vec<Uuid> = pending.iter().skip(1).map(|order| order.id).collect();

        for id in &superseded {
            if let Some(order) = state.orders.get_mut(id) {
                order.status = OrderStatus::Cancelled;
            }
        }

        let (order, created) = match current {
            Some(existing) => (
                OrderRecord {
                    total_amount: cmd.total_amount,
                    last_attempt_at: now,
                    retry_count: existing.retry_count + 1,
                    ..existing
                },
                false,
            ),
            None => (
                OrderRecord {
                    id: Uuid::now_v7(),
                    tenant_id: cmd.tenant_id,
                    store_id: cmd.store_id,
                    buyer_id: cmd.buyer_id,
                    total_amount: cmd.total_amount,
                    status: OrderStatus::Pending,
                    payment_ref: None,
                    retry_count: 0,
                    last_attempt_at: now,
                    abandon_reason: None,
                    paid_at: None,
                    created_at: now,
                },
                true,
            ),
        };

        let mut items = Vec::with_capacity(cmd.items.len());
        for item in &cmd.items {
            items.push(OrderItemRecord {
                id: state.item_id(),
                order_id: order.id,
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
            });
        }

        state.orders.insert(order.id, order.clone());
        state.items.insert(order.id, items.clone());

        Ok(PendingOrderUpsert {
            order: OrderDetail { order, items },
            created,
            superseded,
        })
    }
}

impl Processor<ApplyOrderTransition> for MemoryProcessor {
    type Output = Option<TransitionOutcome>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "MEM:ApplyOrderTransition")]
    async fn process(
        &self,
        cmd: ApplyOrderTransition,
    ) -> Result<Option<TransitionOutcome>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(detail) = state.detail(cmd.order_id) else {
            return Ok(None);
        };

        match lifecycle::plan_transition(detail.order.status, cmd.target) {
            Err(rejection) => {
                return Ok(Some(TransitionOutcome::Rejected {
                    order: detail,
                    rejection,
                }));
            }
            Ok(TransitionPlan::Noop) => {
                return Ok(Some(TransitionOutcome::Unchanged { order: detail }));
            }
            Ok(TransitionPlan::Apply) => {}
        }

        if let Some(reference) = cmd.payment_ref.as_deref() {
            let taken = state.orders.values().any(|other| {
                other.id != detail.order.id
                    && other.store_id == detail.order.store_id
                    && other.payment_ref.as_deref() == Some(reference)
            });
            if taken {
                return Ok(Some(TransitionOutcome::Rejected {
                    order: detail,
                    rejection: TransitionRejection::ReferenceInUse,
                }));
            }
        }

        let OrderDetail { order, items } = detail;
        let now = time::OffsetDateTime::now_utc();

        let mut events: Vec<DomainEvent> = Vec::new();
        let mut stock: BTreeMap<Uuid, i32> = BTreeMap::new();
        if cmd.target == OrderStatus::Paid {
            stock = items
                .iter()
                .filter_map(|item| state.products.get(&item.product_id))
                .map(|product| (product.id, product.stock))
                .collect();
            let reductions = inventory::reduce_for_order(order.id, &items, &mut stock);
            events.extend(reductions.into_iter().map(DomainEvent::StockReducedByOrder));
        }
        events.extend(lifecycle::transition_events(
            &order,
            cmd.target,
            cmd.payment_ref.as_deref(),
            cmd.reason.as_deref(),
        ));

        let previous = order.status;
        let updated = OrderRecord {
            status: cmd.target,
            payment_ref: cmd.payment_ref.or(order.payment_ref.clone()),
            paid_at: if cmd.target == OrderStatus::Paid {
                Some(now)
            } else {
                order.paid_at
            },
            ..order
        };

        let appended = state.append_events(
            events
                .into_iter()
                .map(|event| NewEvent::new(updated.tenant_id, updated.store_id, event))
                .collect(),
            now,
        )?;

        for (product_id, level) in stock {
            if let Some(product) = state.products.get_mut(&product_id) {
                product.stock = level;
            }
            if let Some(inventory) = state.inventories.get_mut(&product_id) {
                inventory.quantity = level;
            }
        }
        state.orders.insert(updated.id, updated.clone());

        Ok(Some(TransitionOutcome::Applied {
            previous,
            order: OrderDetail {
                order: updated,
                items,
            },
            events: appended,
        }))
    }
}

impl Processor<RecordAbandonment> for MemoryProcessor {
    type Output = AbandonOutcome;
    type Error = StoreError;
    async fn process(&self, cmd: RecordAbandonment) -> Result<AbandonOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let Some(order) = state.orders.get(&cmd.order_id).cloned() else {
            return Ok(AbandonOutcome::NotFound);
        };
        if order.status != OrderStatus::Pending {
            return Ok(AbandonOutcome::NotPending(order.status));
        }

        let now = time::OffsetDateTime::now_utc();
        let event = NewEvent::new(
            order.tenant_id,
            order.store_id,
            lifecycle::abandonment_event(order.id, cmd.reason.clone()),
        );
        let mut appended = state.append_events(vec![event], now)?;

        if let Some(order) = state.orders.get_mut(&cmd.order_id) {
            order.abandon_reason = cmd.reason;
            order.last_attempt_at = now;
        }
        match appended.pop() {
            Some(record) => Ok(AbandonOutcome::Recorded(record)),
            None => Err(StoreError::Injected("event log append returned no rows")),
        }
    }
}

impl Processor<CancelStalePendingOrders> for MemoryProcessor {
    type Output = Vec<CancelledOrder>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "MEM:CancelStalePendingOrders")]
    async fn process(
        &self,
        cmd: CancelStalePendingOrders,
    ) -> Result<Vec<CancelledOrder>, StoreError> {
        let mut state = self.state.lock().await;
        let now = time::OffsetDateTime::now_utc();

        let mut stale: Vec<OrderRecord> = state
            .orders
            .values()
            .filter(|order| {
                order.status == OrderStatus::Pending && order.last_attempt_at < cmd.older_than
            })
            .cloned()
            .collect();
        stale.sort_by_key(|order| order.last_attempt_at);
        stale.truncate(usize::try_from(cmd.limit).unwrap_or(0));

        let events = stale
            .iter()
            .map(|order| {
                NewEvent::new(
                    order.tenant_id,
                    order.store_id,
                    lifecycle::cancellation_event(order.id, lifecycle::STALE_REASON),
                )
            })
            .collect();
        let appended = state.append_events(events, now)?;

        let mut result = Vec::with_capacity(stale.len());
        for (order, event) in stale.into_iter().zip(appended) {
            let order = OrderRecord {
                status: OrderStatus::Cancelled,
                ..order
            };
            state.orders.insert(order.id, order.clone());
            result.push(CancelledOrder { order, event });
        }
        Ok(result)
    }
}

impl Processor<ListSettledOrders> for MemoryProcessor {
    type Output = Vec<OrderRecord>;
    type Error = StoreError;
    async fn process(&self, query: ListSettledOrders) -> Result<Vec<OrderRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut orders: Vec<OrderRecord> = state
            .orders
            .values()
            .filter(|order| {
                order.store_id == query.store_id
                    && order.status.is_settled()
                    && order.paid_at.is_some_and(|paid_at| paid_at >= query.since)
            })
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.paid_at);
        Ok(orders)
    }
}

impl Processor<CountOrders> for MemoryProcessor {
    type Output = i64;
    type Error = StoreError;
    async fn process(&self, query: CountOrders) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        let count = state
            .orders
            .values()
            .filter(|order| order.store_id == query.store_id && order.created_at >= query.since)
            .count();
        Ok(count as i64)
    }
}

impl Processor<ListTopProducts> for MemoryProcessor {
    type Output = Vec<TopProductRow>;
    type Error = StoreError;
    async fn process(&self, query: ListTopProducts) -> Result<Vec<TopProductRow>, StoreError> {
        let state = self.state.lock().await;
        let mut totals: HashMap<Uuid, (i64, Decimal)> = HashMap::new();
        for order in state.orders.values().filter(|order| {
            order.store_id == query.store_id
                && order.status.is_settled()
                && order.paid_at.is_some_and(|paid_at| paid_at >= query.since)
        }) {
            for item in state.items.get(&order.id).into_iter().flatten() {
                let entry = totals.entry(item.product_id).or_insert((0, Decimal::ZERO));
                entry.0 += i64::from(item.quantity);
                entry.1 += item.unit_price * Decimal::from(item.quantity);
            }
        }

        let mut rows: Vec<TopProductRow> = totals
            .into_iter()
            .map(|(product_id, (quantity, revenue))| TopProductRow {
                product_id,
                name: state
                    .products
                    .get(&product_id)
                    .map(|product| product.name.clone())
                    .unwrap_or_default(),
                quantity,
                revenue,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.quantity
                .cmp(&a.quantity)
                .then_with(|| b.revenue.cmp(&a.revenue))
        });
        rows.truncate(usize::try_from(query.limit).unwrap_or(0));
        Ok(rows)
    }
}
