use std::collections::BTreeMap;

use crate::entities::OrderStatus;
use crate::entities::event_log::{DomainEvent, EventLogRecord, NewEvent};
use crate::entities::products::ProductRecord;
use crate::error::StoreError;
use crate::framework::DatabaseProcessor;
use crate::inventory;
use crate::lifecycle::{self, TransitionPlan, TransitionRejection};
use kanau::processor::Processor;
use rust_decimal::Decimal;
use stall_sdk::objects::{OrderItemResponse, OrderResponse};
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, tenant_id, store_id, buyer_id, total_amount, status, payment_ref, \
     retry_count, last_attempt_at, abandon_reason, paid_at, created_at";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OrderRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub store_id: Uuid,
    pub buyer_id: Uuid,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_ref: Option<String>,
    pub retry_count: i32,
    pub last_attempt_at: time::OffsetDateTime,
    pub abandon_reason: Option<String>,
    pub paid_at: Option<time::OffsetDateTime>,
    pub created_at: time::OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OrderItemRecord {
    pub id: i64,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// An order together with its items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDetail {
    pub order: OrderRecord,
    pub items: Vec<OrderItemRecord>,
}

impl From<&OrderDetail> for OrderResponse {
    fn from(detail: &OrderDetail) -> Self {
        let order = &detail.order;
        OrderResponse {
            order_id: order.id,
            tenant_id: order.tenant_id,
            store_id: order.store_id,
            buyer_id: order.buyer_id,
            total_amount: order.total_amount,
            status: order.status.into(),
            payment_ref: order.payment_ref.clone(),
            retry_count: order.retry_count,
            abandon_reason: order.abandon_reason.clone(),
            last_attempt_at: order.last_attempt_at.unix_timestamp(),
            paid_at: order.paid_at.map(|at| at.unix_timestamp()),
            created_at: order.created_at.unix_timestamp(),
            items: detail
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
        }
    }
}

/// Item snapshot written at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl OrderRecord {
    async fn lock_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        order_id: Uuid,
    ) -> Result<Option<OrderRecord>, StoreError> {
        let order = sqlx::query_as::<_, OrderRecord>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(order)
    }

    async fn set_status_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        order_id: Uuid,
        status: OrderStatus,
        payment_ref: Option<&str>,
    ) -> Result<OrderRecord, StoreError> {
        let order = sqlx::query_as::<_, OrderRecord>(&format!(
            r#"
            UPDATE orders
            SET status = $2,
                payment_ref = COALESCE($3, payment_ref),
                paid_at = CASE WHEN $2 = 'paid'::order_status THEN now() ELSE paid_at END
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id)
        .bind(status)
        .bind(payment_ref)
        .fetch_one(&mut **tx)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(order)
    }

    /// `true` if another order of the store already carries `payment_ref`.
    ///
    /// Takes a transaction-scoped lock on the (store, reference) pair first.
    async fn reference_taken_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        store_id: Uuid,
        order_id: Uuid,
        payment_ref: &str,
    ) -> Result<bool, StoreError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text || ':' || $2, 0))")
            .bind(store_id)
            .bind(payment_ref)
            .execute(&mut **tx)
            .await?;
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM orders WHERE store_id = $1 AND payment_ref = $2 AND id <> $3)",
        )
        .bind(store_id)
        .bind(payment_ref)
        .bind(order_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(taken)
    }
}

impl OrderItemRecord {
    async fn for_order_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        order_id: Uuid,
    ) -> Result<Vec<OrderItemRecord>, StoreError> {
        let items = sqlx::query_as::<_, OrderItemRecord>(
            r#"
            SELECT id, order_id, product_id, quantity, unit_price
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(items)
    }

    /// Delete every item of `order_id` and insert `items` in their place.
    async fn replace_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        order_id: Uuid,
        items: &[NewOrderItem],
    ) -> Result<Vec<OrderItemRecord>, StoreError> {
        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order_id)
            .execute(&mut **tx)
            .await?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "INSERT INTO order_items (order_id, product_id, quantity, unit_price) ",
        );
        builder.push_values(items, |mut row, item| {
            row.push_bind(order_id)
                .push_bind(item.product_id)
                .push_bind(item.quantity)
                .push_bind(item.unit_price);
        });
        builder.push(" RETURNING id, order_id, product_id, quantity, unit_price");

        let inserted = builder
            .build_query_as::<OrderItemRecord>()
            .fetch_all(&mut **tx)
            .await?;
        Ok(inserted)
    }
}

#[derive(Debug, Clone)]
pub struct GetOrderById {
    pub order_id: Uuid,
}

impl Processor<GetOrderById> for DatabaseProcessor {
    type Output = Option<OrderDetail>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOrderById")]
    async fn process(&self, query: GetOrderById) -> Result<Option<OrderDetail>, StoreError> {
        let Some(order) = sqlx::query_as::<_, OrderRecord>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(query.order_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItemRecord>(
            r#"
            SELECT id, order_id, product_id, quantity, unit_price
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(query.order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(OrderDetail { order, items }))
    }
}

#[derive(Debug, Clone)]
/// Create the buyer's draft order for a store, or update the one that is
/// already pending.
pub struct UpsertPendingOrder {
    pub tenant_id: Uuid,
    pub store_id: Uuid,
    pub buyer_id: Uuid,
    pub total_amount: Decimal,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOrderUpsert {
    pub order: OrderDetail,
    /// `true` if a new order was inserted.
    pub created: bool,
    /// Older pending orders of the same pair that were cancelled.
    pub superseded: Vec<Uuid>,
}

impl Processor<UpsertPendingOrder> for DatabaseProcessor {
    type Output = PendingOrderUpsert;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertPendingOrder")]
    async fn process(&self, cmd: UpsertPendingOrder) -> Result<PendingOrderUpsert, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent checkouts of the same buyer and store.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text || ':' || $2::text, 0))")
            .bind(cmd.buyer_id)
            .bind(cmd.store_id)
            .execute(&mut *tx)
            .await?;

        let pending = sqlx::query_as::<_, OrderRecord>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE buyer_id = $1 AND store_id = $2 AND status = 'pending'
            ORDER BY created_at DESC
            FOR UPDATE
            "#
        ))
        .bind(cmd.buyer_id)
        .bind(cmd.store_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut pending = pending.into_iter();
        let current = pending.next();
        let superseded: Vec<Uuid> = pending.map(|order| order.id).collect();

        if !superseded.is_empty() {
            sqlx::query("UPDATE orders SET status = 'cancelled' WHERE id = ANY($1)")
                .bind(&superseded)
                .execute(&mut *tx)
                .await?;
        }

        let (order, created) = match current {
            Some(existing) => {
                let order = sqlx::query_as::<_, OrderRecord>(&format!(
                    r#"
                    UPDATE orders
                    SET total_amount = $2,
                        last_attempt_at = now(),
                        retry_count = retry_count + 1
                    WHERE id = $1
                    RETURNING {ORDER_COLUMNS}
                    "#
                ))
                .bind(existing.id)
                .bind(cmd.total_amount)
                .fetch_one(&mut *tx)
                .await?;
                (order, false)
            }
            None => {
                let order = sqlx::query_as::<_, OrderRecord>(&format!(
                    r#"
                    INSERT INTO orders
                        (id, tenant_id, store_id, buyer_id, total_amount, status, retry_count, last_attempt_at)
                    VALUES ($1, $2, $3, $4, $5, 'pending', 0, now())
                    RETURNING {ORDER_COLUMNS}
                    "#
                ))
                .bind(Uuid::now_v7())
                .bind(cmd.tenant_id)
                .bind(cmd.store_id)
                .bind(cmd.buyer_id)
                .bind(cmd.total_amount)
                .fetch_one(&mut *tx)
                .await
                .map_err(StoreError::from_sqlx)?;
                (order, true)
            }
        };

        let items = OrderItemRecord::replace_tx(&mut tx, order.id, &cmd.items).await?;

        tx.commit().await?;

        Ok(PendingOrderUpsert {
            order: OrderDetail { order, items },
            created,
            superseded,
        })
    }
}

#[derive(Debug, Clone)]
/// Move an order to `target`, applying the stock and event side effects
/// of the transition in the same transaction.
pub struct ApplyOrderTransition {
    pub order_id: Uuid,
    pub target: OrderStatus,
    pub payment_ref: Option<String>,
    /// Recorded on `ORDER_CANCELLED` events.
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The status changed. `events` are the rows appended with it.
    Applied {
        previous: OrderStatus,
        order: OrderDetail,
        events: Vec<EventLogRecord>,
    },
    /// Already in (or past) the requested state. Nothing was written.
    Unchanged { order: OrderDetail },
    Rejected {
        order: OrderDetail,
        rejection: TransitionRejection,
    },
}

impl Processor<ApplyOrderTransition> for DatabaseProcessor {
    type Output = Option<TransitionOutcome>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:ApplyOrderTransition")]
    async fn process(
        &self,
        cmd: ApplyOrderTransition,
    ) -> Result<Option<TransitionOutcome>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let Some(order) = OrderRecord::lock_tx(&mut tx, cmd.order_id).await? else {
            return Ok(None);
        };
        let items = OrderItemRecord::for_order_tx(&mut tx, order.id).await?;

        match lifecycle::plan_transition(order.status, cmd.target) {
            Err(rejection) => {
                return Ok(Some(TransitionOutcome::Rejected {
                    order: OrderDetail { order, items },
                    rejection,
                }));
            }
            Ok(TransitionPlan::Noop) => {
                return Ok(Some(TransitionOutcome::Unchanged {
                    order: OrderDetail { order, items },
                }));
            }
            Ok(TransitionPlan::Apply) => {}
        }

        if let Some(reference) = cmd.payment_ref.as_deref() {
            if OrderRecord::reference_taken_tx(&mut tx, order.store_id, order.id, reference).await? {
                return Ok(Some(TransitionOutcome::Rejected {
                    order: OrderDetail { order, items },
                    rejection: TransitionRejection::ReferenceInUse,
                }));
            }
        }

        let mut events: Vec<DomainEvent> = Vec::new();
        if cmd.target == OrderStatus::Paid {
            let mut product_ids: Vec<Uuid> = items.iter().map(|item| item.product_id).collect();
            product_ids.sort();
            product_ids.dedup();

            let mut stock: BTreeMap<Uuid, i32> =
                ProductRecord::lock_many_tx(&mut tx, &product_ids)
                    .await?
                    .into_iter()
                    .map(|product| (product.id, product.stock))
                    .collect();
            let reductions = inventory::reduce_for_order(order.id, &items, &mut stock);

            for (product_id, level) in &stock {
                ProductRecord::set_stock_tx(&mut tx, *product_id, *level).await?;
            }
            events.extend(reductions.into_iter().map(DomainEvent::StockReducedByOrder));
        }
        events.extend(lifecycle::transition_events(
            &order,
            cmd.target,
            cmd.payment_ref.as_deref(),
            cmd.reason.as_deref(),
        ));

        let previous = order.status;
        let updated =
            OrderRecord::set_status_tx(&mut tx, order.id, cmd.target, cmd.payment_ref.as_deref())
                .await?;

        let mut appended = Vec::with_capacity(events.len());
        for event in events {
            let new = NewEvent::new(updated.tenant_id, updated.store_id, event);
            appended.push(EventLogRecord::insert_tx(&mut tx, &new).await?);
        }

        tx.commit().await?;

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

#[derive(Debug, Clone)]
/// Record why a buyer left checkout. Only pending orders are touched.
pub struct RecordAbandonment {
    pub order_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbandonOutcome {
    NotFound,
    NotPending(OrderStatus),
    Recorded(EventLogRecord),
}

impl Processor<RecordAbandonment> for DatabaseProcessor {
    type Output = AbandonOutcome;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:RecordAbandonment")]
    async fn process(&self, cmd: RecordAbandonment) -> Result<AbandonOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let Some(order) = OrderRecord::lock_tx(&mut tx, cmd.order_id).await? else {
            return Ok(AbandonOutcome::NotFound);
        };
        if order.status != OrderStatus::Pending {
            return Ok(AbandonOutcome::NotPending(order.status));
        }

        sqlx::query(
            r#"
            UPDATE orders
            SET abandon_reason = $2, last_attempt_at = now()
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(cmd.reason.as_deref())
        .execute(&mut *tx)
        .await?;

        let event = NewEvent::new(
            order.tenant_id,
            order.store_id,
            lifecycle::abandonment_event(order.id, cmd.reason),
        );
        let record = EventLogRecord::insert_tx(&mut tx, &event).await?;

        tx.commit().await?;
        Ok(AbandonOutcome::Recorded(record))
    }
}

#[derive(Debug, Clone)]
/// Cancel pending orders whose last checkout attempt is older than
/// `older_than`, oldest first, at most `limit` per call.
pub struct CancelStalePendingOrders {
    pub older_than: time::OffsetDateTime,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancelledOrder {
    pub order: OrderRecord,
    pub event: EventLogRecord,
}

impl Processor<CancelStalePendingOrders> for DatabaseProcessor {
    type Output = Vec<CancelledOrder>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:CancelStalePendingOrders")]
    async fn process(
        &self,
        cmd: CancelStalePendingOrders,
    ) -> Result<Vec<CancelledOrder>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let cancelled = sqlx::query_as::<_, OrderRecord>(
            r#"
            WITH stale AS (
                SELECT id FROM orders
                WHERE status = 'pending' AND last_attempt_at < $1
                ORDER BY last_attempt_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE orders
            SET status = 'cancelled'
            FROM stale
            WHERE orders.id = stale.id
            RETURNING orders.*
            "#,
        )
        .bind(cmd.older_than)
        .bind(cmd.limit)
        .fetch_all(&mut *tx)
        .await?;

        let mut result = Vec::with_capacity(cancelled.len());
        for order in cancelled {
            let new = NewEvent::new(
                order.tenant_id,
                order.store_id,
                lifecycle::cancellation_event(order.id, lifecycle::STALE_REASON),
            );
            let event = EventLogRecord::insert_tx(&mut tx, &new).await?;
            result.push(CancelledOrder { order, event });
        }

        tx.commit().await?;
        Ok(result)
    }
}

#[derive(Debug, Clone)]
/// Orders of a store paid at or after `since`, in any settled state.
pub struct ListSettledOrders {
    pub store_id: Uuid,
    pub since: time::OffsetDateTime,
}

impl Processor<ListSettledOrders> for DatabaseProcessor {
    type Output = Vec<OrderRecord>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:ListSettledOrders")]
    async fn process(&self, query: ListSettledOrders) -> Result<Vec<OrderRecord>, StoreError> {
        let orders = sqlx::query_as::<_, OrderRecord>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE store_id = $1
              AND status IN ('paid', 'shipped', 'delivered')
              AND paid_at >= $2
            ORDER BY paid_at
            "#
        ))
        .bind(query.store_id)
        .bind(query.since)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }
}

#[derive(Debug, Clone)]
/// Number of orders of a store created at or after `since`, any status.
pub struct CountOrders {
    pub store_id: Uuid,
    pub since: time::OffsetDateTime,
}

impl Processor<CountOrders> for DatabaseProcessor {
    type Output = i64;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:CountOrders")]
    async fn process(&self, query: CountOrders) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM orders
            WHERE store_id = $1 AND created_at >= $2
            "#,
        )
        .bind(query.store_id)
        .bind(query.since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

/// Units and revenue sold of one product.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TopProductRow {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone)]
/// Best-selling products by quantity across settled orders paid since
/// `since`.
pub struct ListTopProducts {
    pub store_id: Uuid,
    pub since: time::OffsetDateTime,
    pub limit: i64,
}

impl Processor<ListTopProducts> for DatabaseProcessor {
    type Output = Vec<TopProductRow>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:ListTopProducts")]
    async fn process(&self, query: ListTopProducts) -> Result<Vec<TopProductRow>, StoreError> {
        let rows = sqlx::query_as::<_, TopProductRow>(
            r#"
            SELECT oi.product_id,
                   COALESCE(p.name, '') AS name,
                   SUM(oi.quantity)::bigint AS quantity,
                   SUM(oi.quantity * oi.unit_price) AS revenue
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            LEFT JOIN products p ON p.id = oi.product_id
            WHERE o.store_id = $1
              AND o.status IN ('paid', 'shipped', 'delivered')
              AND o.paid_at >= $2
            GROUP BY oi.product_id, p.name
            ORDER BY quantity DESC, revenue DESC
            LIMIT $3
            "#,
        )
        .bind(query.store_id)
        .bind(query.since)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
