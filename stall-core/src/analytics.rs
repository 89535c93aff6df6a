//! Read models replayed from orders and the event log.
//!
//! Nothing here is authoritative and nothing is cached: every call
//! recomputes from the store of record.

use std::collections::HashMap;

use rust_decimal::Decimal;
use stall_sdk::objects::{
    ActivityItem, AdjustmentKind, FunnelStage, FunnelStats, FunnelStep, InventoryActivity,
    InventorySnapshot, StockLevel, StoreOverview, TelemetryEvent, TimelineBucket, TimelineStats,
    TopProduct,
};
use tracing::debug;
use uuid::Uuid;

use crate::entities::event_log::{
    ADD_TO_CART, AppendEvent, CHECKOUT_START, CountEventsByType, DomainEvent, EventLogRecord,
    ListRecentEvents, NewEvent, PRODUCT_RESTOCKED, PRODUCT_VIEW, SESSION_START,
    STOCK_ADJUSTED_MANUALLY,
};
use crate::entities::order_records::{CountOrders, ListSettledOrders, ListTopProducts, OrderRecord};
use crate::entities::products::{DEFAULT_LOW_STOCK_ALERT, ListStoreStock};
use crate::entities::stores::{GetStoreById, StoreRecord};
use crate::error::CommerceError;
use crate::events::StoreBroadcaster;
use crate::framework::CommerceStore;

pub const MAX_WINDOW_DAYS: u32 = 365;
const RECENT_INVENTORY_ACTIVITY: i64 = 10;
const TOP_PRODUCTS: i64 = 5;
pub const MAX_FEED_ITEMS: i64 = 100;

/// Multipliers of the order count used for a store without telemetry.
const SYNTHETIC_SESSIONS: u64 = 10;
const SYNTHETIC_PRODUCT_VIEWS: u64 = 6;
const SYNTHETIC_ADD_TO_CART: u64 = 3;
const SYNTHETIC_CHECKOUT_STARTED: u64 = 2;

fn window_start(today: time::Date, days: u32) -> time::Date {
    today.saturating_sub(time::Duration::days(i64::from(days.saturating_sub(1))))
}

fn validate_window(days: u32) -> Result<(), CommerceError> {
    if days == 0 || days > MAX_WINDOW_DAYS {
        return Err(CommerceError::validation(format!(
            "days must be between 1 and {MAX_WINDOW_DAYS}"
        )));
    }
    Ok(())
}

/// Bucket settled orders per UTC day of payment.
///
/// Returns exactly `days` buckets ending with `today`, oldest first. Orders
/// paid outside the window are ignored.
pub fn bucket_timeline(orders: &[OrderRecord], today: time::Date, days: u32) -> Vec<TimelineBucket> {
    let start = window_start(today, days);
    let mut buckets: Vec<TimelineBucket> = (0..days)
        .map(|offset| TimelineBucket {
            date: start.saturating_add(time::Duration::days(i64::from(offset))),
            revenue: Decimal::ZERO,
            orders: 0,
        })
        .collect();

    for order in orders.iter().filter(|order| order.status.is_settled()) {
        let Some(paid_at) = order.paid_at else {
            continue;
        };
        let day = paid_at.to_offset(time::UtcOffset::UTC).date();
        let index = (day - start).whole_days();
        if let Some(bucket) = usize::try_from(index).ok().and_then(|i| buckets.get_mut(i)) {
            bucket.revenue += order.total_amount;
            bucket.orders += 1;
        }
    }
    buckets
}

/// Build the conversion funnel from per-kind event counts.
///
/// With no telemetry at all the steps are projected from `orders` and
/// flagged as synthetic.
pub fn build_funnel(event_counts: &HashMap<String, i64>, orders: u64, purchased: u64) -> FunnelStats {
    let count = |kind: &str| {
        event_counts
            .get(kind)
            .copied()
            .and_then(|c| u64::try_from(c).ok())
            .unwrap_or(0)
    };
    let measured = [
        (FunnelStage::Sessions, count(SESSION_START)),
        (FunnelStage::ProductViews, count(PRODUCT_VIEW)),
        (FunnelStage::AddToCart, count(ADD_TO_CART)),
        (FunnelStage::CheckoutStarted, count(CHECKOUT_START)),
    ];
    let synthetic = measured.iter().all(|(_, count)| *count == 0);

    let mut steps: Vec<FunnelStep> = if synthetic {
        vec![
            FunnelStep {
                stage: FunnelStage::Sessions,
                count: orders.saturating_mul(SYNTHETIC_SESSIONS),
            },
            FunnelStep {
                stage: FunnelStage::ProductViews,
                count: orders.saturating_mul(SYNTHETIC_PRODUCT_VIEWS),
            },
            FunnelStep {
                stage: FunnelStage::AddToCart,
                count: orders.saturating_mul(SYNTHETIC_ADD_TO_CART),
            },
            FunnelStep {
                stage: FunnelStage::CheckoutStarted,
                count: orders.saturating_mul(SYNTHETIC_CHECKOUT_STARTED),
            },
        ]
    } else {
        measured
            .into_iter()
            .map(|(stage, count)| FunnelStep { stage, count })
            .collect()
    };
    steps.push(FunnelStep {
        stage: FunnelStage::Purchased,
        count: purchased,
    });
    FunnelStats { steps, synthetic }
}

fn inventory_activity(record: &EventLogRecord) -> Option<InventoryActivity> {
    let (kind, payload) = match &record.event {
        DomainEvent::ProductRestocked(payload) => (AdjustmentKind::Restock, payload),
        DomainEvent::StockAdjustedManually(payload) => (AdjustmentKind::ManualAdjustment, payload),
        _ => return None,
    };
    Some(InventoryActivity {
        product_id: payload.product_id,
        kind,
        prev_quantity: payload.prev_quantity,
        new_quantity: payload.new_quantity,
        at: record.created_at.unix_timestamp(),
    })
}

#[derive(Clone)]
pub struct Analytics<S> {
    store: S,
    broadcaster: StoreBroadcaster,
}

impl<S: CommerceStore> Analytics<S> {
    pub fn new(store: S, broadcaster: StoreBroadcaster) -> Self {
        Self { store, broadcaster }
    }

    async fn load_store(&self, store_id: Uuid) -> Result<StoreRecord, CommerceError> {
        self.store
            .process(GetStoreById { store_id })
            .await?
            .ok_or_else(|| CommerceError::not_found("store", store_id))
    }

    fn since(days: u32) -> (time::Date, time::OffsetDateTime) {
        let today = time::OffsetDateTime::now_utc().date();
        let since = window_start(today, days).midnight().assume_utc();
        (today, since)
    }

    /// Revenue and paid-order count per day for the last `days` days.
    pub async fn timeline(&self, store_id: Uuid, days: u32) -> Result<TimelineStats, CommerceError> {
        validate_window(days)?;
        self.load_store(store_id).await?;
        let (today, since) = Self::since(days);

        let orders = self
            .store
            .process(ListSettledOrders { store_id, since })
            .await?;
        Ok(TimelineStats {
            store_id,
            days,
            buckets: bucket_timeline(&orders, today, days),
        })
    }

    /// Low and out-of-stock products plus the latest manual stock changes.
    pub async fn inventory_snapshot(
        &self,
        store_id: Uuid,
    ) -> Result<InventorySnapshot, CommerceError> {
        self.load_store(store_id).await?;
        let levels = self.store.process(ListStoreStock { store_id }).await?;

        let mut low_stock = Vec::new();
        let mut out_of_stock = Vec::new();
        for row in levels {
            let level = StockLevel {
                product_id: row.product_id,
                name: row.name,
                stock: row.stock,
                low_stock_alert: row.low_stock_alert.unwrap_or(DEFAULT_LOW_STOCK_ALERT),
            };
            if level.stock <= 0 {
                out_of_stock.push(level);
            } else if level.stock <= level.low_stock_alert {
                low_stock.push(level);
            }
        }

        let recent = self
            .store
            .process(ListRecentEvents {
                store_id,
                event_types: vec![
                    PRODUCT_RESTOCKED.to_owned(),
                    STOCK_ADJUSTED_MANUALLY.to_owned(),
                ],
                limit: RECENT_INVENTORY_ACTIVITY,
            })
            .await?;

        Ok(InventorySnapshot {
            store_id,
            low_stock,
            out_of_stock,
            recent_activity: recent.iter().filter_map(inventory_activity).collect(),
        })
    }

    /// Conversion funnel over the last `days` days.
    pub async fn funnel(&self, store_id: Uuid, days: u32) -> Result<FunnelStats, CommerceError> {
        validate_window(days)?;
        self.load_store(store_id).await?;
        let (_, since) = Self::since(days);

        let counts: HashMap<String, i64> = self
            .store
            .process(CountEventsByType { store_id, since })
            .await?
            .into_iter()
            .map(|row| (row.event_type, row.count))
            .collect();
        let orders = self.store.process(CountOrders { store_id, since }).await?;
        let purchased = self
            .store
            .process(ListSettledOrders { store_id, since })
            .await?
            .len();

        let funnel = build_funnel(
            &counts,
            u64::try_from(orders).unwrap_or(0),
            purchased as u64,
        );
        if funnel.synthetic {
            debug!(store_id = %store_id, "No telemetry recorded, returning synthetic funnel");
        }
        Ok(funnel)
    }

    /// Revenue, order count, average order value and best sellers.
    pub async fn overview(&self, store_id: Uuid, days: u32) -> Result<StoreOverview, CommerceError> {
        validate_window(days)?;
        self.load_store(store_id).await?;
        let (_, since) = Self::since(days);

        let orders = self
            .store
            .process(ListSettledOrders { store_id, since })
            .await?;
        let revenue: Decimal = orders.iter().map(|order| order.total_amount).sum();
        let paid_orders = orders.len() as u64;
        let average_order_value = if paid_orders == 0 {
            Decimal::ZERO
        } else {
            (revenue / Decimal::from(paid_orders)).round_dp(2)
        };

        let top_products = self
            .store
            .process(ListTopProducts {
                store_id,
                since,
                limit: TOP_PRODUCTS,
            })
            .await?
            .into_iter()
            .map(|row| TopProduct {
                product_id: row.product_id,
                name: row.name,
                quantity: row.quantity,
                revenue: row.revenue,
            })
            .collect();

        Ok(StoreOverview {
            store_id,
            days,
            revenue,
            paid_orders,
            average_order_value,
            top_products,
        })
    }

    /// The store's latest events rendered as notifications, newest first.
    pub async fn activity_feed(
        &self,
        store_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ActivityItem>, CommerceError> {
        self.load_store(store_id).await?;
        let events = self
            .store
            .process(ListRecentEvents {
                store_id,
                event_types: Vec::new(),
                limit: limit.clamp(1, MAX_FEED_ITEMS),
            })
            .await?;
        Ok(events.iter().map(crate::notifications::activity_item).collect())
    }

    /// Append a storefront telemetry event.
    pub async fn record_event(
        &self,
        store_id: Uuid,
        event: TelemetryEvent,
    ) -> Result<EventLogRecord, CommerceError> {
        let store = self.load_store(store_id).await?;
        let record = self
            .store
            .process(AppendEvent {
                event: NewEvent::new(store.tenant_id, store.id, DomainEvent::from(event)),
            })
            .await?;
        self.broadcaster.publish_events(std::slice::from_ref(&record));
        self.broadcaster.stats_updated(store.id);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::OrderStatus;
    use crate::inventory::InventoryEngine;
    use crate::testing::{Fixture, cart};
    use time::macros::date;

    fn settled(total: i64, paid_at: time::OffsetDateTime) -> OrderRecord {
        OrderRecord {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            store_id: Uuid::nil(),
            buyer_id: Uuid::nil(),
            total_amount: Decimal::from(total),
            status: OrderStatus::Paid,
            payment_ref: Some("ref".into()),
            retry_count: 0,
            last_attempt_at: paid_at,
            abandon_reason: None,
            paid_at: Some(paid_at),
            created_at: paid_at,
        }
    }

    #[test]
    fn test_timeline_has_one_bucket_per_day() {
        let today = date!(2026 - 03 - 10);
        let orders = vec![
            settled(100, date!(2026 - 03 - 10).with_hms(23, 59, 0).unwrap().assume_utc()),
            settled(50, date!(2026 - 03 - 10).midnight().assume_utc()),
            settled(70, date!(2026 - 03 - 04).with_hms(12, 0, 0).unwrap().assume_utc()),
            // Outside the window.
            settled(999, date!(2026 - 03 - 03).with_hms(23, 0, 0).unwrap().assume_utc()),
        ];

        let buckets = bucket_timeline(&orders, today, 7);
        assert_eq!(buckets.len(), 7);
        assert_eq!(buckets[0].date, date!(2026 - 03 - 04));
        assert_eq!(buckets[6].date, today);
        assert_eq!(buckets[0].orders, 1);
        assert_eq!(buckets[0].revenue, Decimal::from(70));
        assert_eq!(buckets[6].orders, 2);
        assert_eq!(buckets[6].revenue, Decimal::from(150));
        assert!(buckets[1..6].iter().all(|b| b.orders == 0 && b.revenue.is_zero()));
    }

    #[test]
    fn test_timeline_ignores_unsettled_orders() {
        let today = date!(2026 - 03 - 10);
        let mut cancelled = settled(100, today.midnight().assume_utc());
        cancelled.status = OrderStatus::Cancelled;
        let buckets = bucket_timeline(&[cancelled], today, 1);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].orders, 0);
    }

    #[test]
    fn test_synthetic_funnel_is_flagged() {
        let funnel = build_funnel(&HashMap::new(), 4, 1);
        assert!(funnel.synthetic);
        let counts: Vec<u64> = funnel.steps.iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![40, 24, 12, 8, 1]);

        let measured = HashMap::from([(SESSION_START.to_owned(), 12), (ADD_TO_CART.to_owned(), 3)]);
        let funnel = build_funnel(&measured, 4, 1);
        assert!(!funnel.synthetic);
        let counts: Vec<u64> = funnel.steps.iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![12, 0, 3, 0, 1]);
        assert_eq!(funnel.steps[4].stage, FunnelStage::Purchased);
    }

    #[tokio::test]
    async fn test_window_bounds_are_validated() {
        let fx = Fixture::new().await;
        let analytics = fx.analytics();
        assert!(matches!(
            analytics.timeline(fx.store_id, 0).await,
            Err(CommerceError::Validation(_))
        ));
        assert!(matches!(
            analytics.timeline(fx.store_id, MAX_WINDOW_DAYS + 1).await,
            Err(CommerceError::Validation(_))
        ));
        assert!(matches!(
            analytics.timeline(Uuid::new_v4(), 7).await,
            Err(CommerceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_paid_orders_feed_timeline_and_overview() {
        let fx = Fixture::new().await;
        let a = fx.product_priced(500, 10).await;
        let b = fx.product_priced(300, 10).await;
        let lifecycle = fx.lifecycle();
        let order_id = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 1300, &[(a, 2, 500), (b, 1, 300)]))
            .await
            .unwrap()
            .order
            .order
            .id;
        lifecycle.confirm_payment(order_id, "ref_1").await.unwrap();

        let analytics = fx.analytics();
        let timeline = analytics.timeline(fx.store_id, 7).await.unwrap();
        assert_eq!(timeline.buckets.len(), 7);
        assert_eq!(timeline.buckets[6].orders, 1);
        assert_eq!(timeline.buckets[6].revenue, Decimal::from(1300));

        let overview = analytics.overview(fx.store_id, 30).await.unwrap();
        assert_eq!(overview.paid_orders, 1);
        assert_eq!(overview.revenue, Decimal::from(1300));
        assert_eq!(overview.average_order_value, Decimal::from(1300));
        assert_eq!(overview.top_products[0].product_id, a);
        assert_eq!(overview.top_products[0].quantity, 2);
        assert_eq!(overview.top_products[0].revenue, Decimal::from(1000));
    }

    #[tokio::test]
    async fn test_funnel_counts_recorded_telemetry() {
        let fx = Fixture::new().await;
        let a = fx.product_priced(500, 10).await;
        let analytics = fx.analytics();

        let empty = analytics.funnel(fx.store_id, 30).await.unwrap();
        assert!(empty.synthetic);
        assert!(empty.steps.iter().all(|s| s.count == 0));

        for event in [
            TelemetryEvent::SessionStart { session_id: None },
            TelemetryEvent::SessionStart {
                session_id: Some("s2".into()),
            },
            TelemetryEvent::ProductView { product_id: a },
            TelemetryEvent::AddToCart {
                product_id: a,
                quantity: 1,
            },
        ] {
            analytics.record_event(fx.store_id, event).await.unwrap();
        }

        let funnel = analytics.funnel(fx.store_id, 30).await.unwrap();
        assert!(!funnel.synthetic);
        let counts: Vec<u64> = funnel.steps.iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![2, 1, 1, 0, 0]);
    }

    #[tokio::test]
    async fn test_inventory_snapshot_classifies_stock() {
        let fx = Fixture::new().await;
        let plenty = fx.product(50).await;
        let low = fx.product(3).await;
        let gone = fx.product(0).await;
        let engine = InventoryEngine::new(fx.memory.clone(), fx.broadcaster.clone());
        engine.adjust_stock(fx.store_id, low, 2).await.unwrap();

        let snapshot = fx.analytics().inventory_snapshot(fx.store_id).await.unwrap();
        let ids = |levels: &[StockLevel]| levels.iter().map(|l| l.product_id).collect::<Vec<_>>();
        assert_eq!(ids(&snapshot.low_stock), vec![low]);
        assert_eq!(ids(&snapshot.out_of_stock), vec![gone]);
        assert!(!ids(&snapshot.low_stock).contains(&plenty));
        assert_eq!(snapshot.recent_activity.len(), 1);
        assert_eq!(snapshot.recent_activity[0].kind, AdjustmentKind::ManualAdjustment);
        assert_eq!(snapshot.recent_activity[0].new_quantity, 2);
    }

    #[tokio::test]
    async fn test_activity_feed_renders_unknown_events() {
        let fx = Fixture::new().await;
        fx.memory
            .insert_event(
                NewEvent::new(
                    fx.tenant_id,
                    fx.store_id,
                    DomainEvent::from_parts("LOYALTY_POINTS_GRANTED", serde_json::json!({"points": 5})),
                ),
                time::OffsetDateTime::now_utc(),
            )
            .await;

        let feed = fx.analytics().activity_feed(fx.store_id, 20).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].event_type, "LOYALTY_POINTS_GRANTED");
        assert_eq!(feed[0].notification.title, "Activity recorded");
    }
}
