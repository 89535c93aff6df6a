//! Append-only event log.
//!
//! Rows are never updated or deleted (the table carries a trigger that
//! rejects both). Each row stores its kind as text plus a JSON payload; in
//! Rust the pair is the [`DomainEvent`] enum, with [`DomainEvent::Unknown`]
//! catching kinds and payload shapes this build does not know.

use crate::entities::OrderStatus;
use crate::error::StoreError;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockReducedByOrder {
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub prev_stock: i32,
    pub new_stock: i32,
    /// Set when the decrement took stock below zero.
    #[serde(default)]
    pub oversold: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjusted {
    pub product_id: Uuid,
    pub prev_quantity: i32,
    pub new_quantity: i32,
    pub added: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlaced {
    pub order_id: Uuid,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSucceeded {
    pub order_id: Uuid,
    pub reference: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusChanged {
    pub order_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelled {
    pub order_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutAbandoned {
    pub order_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStarted {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductViewed {
    pub product_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedToCart {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStarted {
    #[serde(default)]
    pub order_id: Option<Uuid>,
}

/// A domain event as stored in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "eventType",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum DomainEvent {
    StockReducedByOrder(StockReducedByOrder),
    ProductRestocked(StockAdjusted),
    StockAdjustedManually(StockAdjusted),
    OrderPlaced(OrderPlaced),
    PaymentSuccess(PaymentSucceeded),
    OrderStatusChanged(OrderStatusChanged),
    OrderCancelled(OrderCancelled),
    CheckoutAbandoned(CheckoutAbandoned),
    SessionStart(SessionStarted),
    ProductView(ProductViewed),
    AddToCart(AddedToCart),
    CheckoutStart(CheckoutStarted),
    /// A kind or payload shape not known to this build.
    #[serde(skip)]
    Unknown { event_type: String, payload: Value },
}

pub const STOCK_REDUCED_BY_ORDER: &str = "STOCK_REDUCED_BY_ORDER";
pub const PRODUCT_RESTOCKED: &str = "PRODUCT_RESTOCKED";
pub const STOCK_ADJUSTED_MANUALLY: &str = "STOCK_ADJUSTED_MANUALLY";
pub const ORDER_PLACED: &str = "ORDER_PLACED";
pub const PAYMENT_SUCCESS: &str = "PAYMENT_SUCCESS";
pub const ORDER_STATUS_CHANGED: &str = "ORDER_STATUS_CHANGED";
pub const ORDER_CANCELLED: &str = "ORDER_CANCELLED";
pub const CHECKOUT_ABANDONED: &str = "CHECKOUT_ABANDONED";
pub const SESSION_START: &str = "SESSION_START";
pub const PRODUCT_VIEW: &str = "PRODUCT_VIEW";
pub const ADD_TO_CART: &str = "ADD_TO_CART";
pub const CHECKOUT_START: &str = "CHECKOUT_START";

impl DomainEvent {
    /// The stored `event_type` string.
    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::StockReducedByOrder(_) => STOCK_REDUCED_BY_ORDER,
            DomainEvent::ProductRestocked(_) => PRODUCT_RESTOCKED,
            DomainEvent::StockAdjustedManually(_) => STOCK_ADJUSTED_MANUALLY,
            DomainEvent::OrderPlaced(_) => ORDER_PLACED,
            DomainEvent::PaymentSuccess(_) => PAYMENT_SUCCESS,
            DomainEvent::OrderStatusChanged(_) => ORDER_STATUS_CHANGED,
            DomainEvent::OrderCancelled(_) => ORDER_CANCELLED,
            DomainEvent::CheckoutAbandoned(_) => CHECKOUT_ABANDONED,
            DomainEvent::SessionStart(_) => SESSION_START,
            DomainEvent::ProductView(_) => PRODUCT_VIEW,
            DomainEvent::AddToCart(_) => ADD_TO_CART,
            DomainEvent::CheckoutStart(_) => CHECKOUT_START,
            DomainEvent::Unknown { event_type, .. } => event_type,
        }
    }

    /// Rebuild an event from its stored columns.
    ///
    /// Never fails: unknown kinds and payloads that do not match the known
    /// schema become [`DomainEvent::Unknown`].
    pub fn from_parts(event_type: &str, payload: Value) -> Self {
        let tagged = serde_json::json!({ "eventType": event_type, "payload": payload });
        match serde_json::from_value::<DomainEvent>(tagged) {
            Ok(event) => event,
            Err(_) => DomainEvent::Unknown {
                event_type: event_type.to_owned(),
                payload,
            },
        }
    }

    /// The JSON payload column value.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        if let DomainEvent::Unknown { payload, .. } = self {
            return Ok(payload.clone());
        }
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// The order this event refers to, if any.
    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            DomainEvent::StockReducedByOrder(e) => Some(e.order_id),
            DomainEvent::OrderPlaced(e) => Some(e.order_id),
            DomainEvent::PaymentSuccess(e) => Some(e.order_id),
            DomainEvent::OrderStatusChanged(e) => Some(e.order_id),
            DomainEvent::OrderCancelled(e) => Some(e.order_id),
            DomainEvent::CheckoutAbandoned(e) => Some(e.order_id),
            DomainEvent::CheckoutStart(e) => e.order_id,
            DomainEvent::ProductRestocked(_)
            | DomainEvent::StockAdjustedManually(_)
            | DomainEvent::SessionStart(_)
            | DomainEvent::ProductView(_)
            | DomainEvent::AddToCart(_)
            | DomainEvent::Unknown { .. } => None,
        }
    }
}

impl From<stall_sdk::objects::TelemetryEvent> for DomainEvent {
    fn from(event: stall_sdk::objects::TelemetryEvent) -> Self {
        use stall_sdk::objects::TelemetryEvent;
        match event {
            TelemetryEvent::SessionStart { session_id } => {
                DomainEvent::SessionStart(SessionStarted { session_id })
            }
            TelemetryEvent::ProductView { product_id } => {
                DomainEvent::ProductView(ProductViewed { product_id })
            }
            TelemetryEvent::AddToCart {
                product_id,
                quantity,
            } => DomainEvent::AddToCart(AddedToCart {
                product_id,
                quantity,
            }),
            TelemetryEvent::CheckoutStart { order_id } => {
                DomainEvent::CheckoutStart(CheckoutStarted { order_id })
            }
        }
    }
}

/// An event to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub tenant_id: Uuid,
    pub store_id: Uuid,
    pub event: DomainEvent,
}

impl NewEvent {
    pub fn new(tenant_id: Uuid, store_id: Uuid, event: DomainEvent) -> Self {
        Self {
            tenant_id,
            store_id,
            event,
        }
    }
}

/// A committed event log row.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogRecord {
    pub id: i64,
    pub tenant_id: Uuid,
    pub store_id: Uuid,
    pub event: DomainEvent,
    pub created_at: time::OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct EventLogRow {
    id: i64,
    tenant_id: Uuid,
    store_id: Uuid,
    event_type: String,
    payload: Json<Value>,
    created_at: time::OffsetDateTime,
}

impl From<EventLogRow> for EventLogRecord {
    fn from(row: EventLogRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            store_id: row.store_id,
            event: DomainEvent::from_parts(&row.event_type, row.payload.0),
            created_at: row.created_at,
        }
    }
}

impl EventLogRecord {
    /// Append an event inside an open transaction.
    ///
    /// A failure here fails the surrounding transaction, so no state change
    /// commits without its audit row.
    pub async fn insert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        new: &NewEvent,
    ) -> Result<EventLogRecord, StoreError> {
        let payload = new.event.payload()?;
        let row = sqlx::query_as::<_, EventLogRow>(
            r#"
            INSERT INTO event_logs (tenant_id, store_id, event_type, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING id, tenant_id, store_id, event_type, payload, created_at
            "#,
        )
        .bind(new.tenant_id)
        .bind(new.store_id)
        .bind(new.event.event_type())
        .bind(Json(payload))
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.into())
    }
}

#[derive(Debug, Clone)]
/// Append a single event outside of any other write (storefront telemetry).
pub struct AppendEvent {
    pub event: NewEvent,
}

impl Processor<AppendEvent> for DatabaseProcessor {
    type Output = EventLogRecord;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:AppendEvent")]
    async fn process(&self, cmd: AppendEvent) -> Result<EventLogRecord, StoreError> {
        let mut tx = self.pool.begin().await?;
        let record = EventLogRecord::insert_tx(&mut tx, &cmd.event).await?;
        tx.commit().await?;
        Ok(record)
    }
}

#[derive(Debug, Clone)]
/// Most recent events of a store, newest first.
///
/// An empty `event_types` selects every kind.
pub struct ListRecentEvents {
    pub store_id: Uuid,
    pub event_types: Vec<String>,
    pub limit: i64,
}

impl Processor<ListRecentEvents> for DatabaseProcessor {
    type Output = Vec<EventLogRecord>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:ListRecentEvents")]
    async fn process(&self, query: ListRecentEvents) -> Result<Vec<EventLogRecord>, StoreError> {
        let rows = sqlx::query_as::<_, EventLogRow>(
            r#"
            SELECT id, tenant_id, store_id, event_type, payload, created_at
            FROM event_logs
            WHERE store_id = $1
              AND (cardinality($2::text[]) = 0 OR event_type = ANY($2))
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(query.store_id)
        .bind(&query.event_types)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EventLogRecord::from).collect())
    }
}

/// Number of events of one kind.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct EventTypeCount {
    pub event_type: String,
    pub count: i64,
}

#[derive(Debug, Clone)]
/// Count a store's events per kind since `since`.
pub struct CountEventsByType {
    pub store_id: Uuid,
    pub since: time::OffsetDateTime,
}

impl Processor<CountEventsByType> for DatabaseProcessor {
    type Output = Vec<EventTypeCount>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:CountEventsByType")]
    async fn process(&self, query: CountEventsByType) -> Result<Vec<EventTypeCount>, StoreError> {
        let counts = sqlx::query_as::<_, EventTypeCount>(
            r#"
            SELECT event_type, COUNT(*) AS count
            FROM event_logs
            WHERE store_id = $1 AND created_at >= $2
            GROUP BY event_type
            "#,
        )
        .bind(query.store_id)
        .bind(query.since)
        .fetch_all(&self.pool)
        .await?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_event_round_trips_through_columns() {
        let event = DomainEvent::StockReducedByOrder(StockReducedByOrder {
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity: 2,
            prev_stock: 10,
            new_stock: 8,
            oversold: false,
        });
        let payload = event.payload().unwrap();
        assert_eq!(payload["prevStock"], 10);
        assert_eq!(payload["newStock"], 8);
        assert!(payload.get("eventType").is_none());

        let restored = DomainEvent::from_parts(event.event_type(), payload);
        assert_eq!(restored, event);
    }

    #[test]
    fn test_unknown_kind_is_preserved() {
        let payload = serde_json::json!({ "campaign": "spring" });
        let event = DomainEvent::from_parts("NEWSLETTER_SIGNUP", payload.clone());
        assert_eq!(
            event,
            DomainEvent::Unknown {
                event_type: "NEWSLETTER_SIGNUP".into(),
                payload: payload.clone(),
            }
        );
        assert_eq!(event.event_type(), "NEWSLETTER_SIGNUP");
        assert_eq!(event.payload().unwrap(), payload);
    }

    #[test]
    fn test_known_kind_with_malformed_payload_is_unknown() {
        let payload = serde_json::json!({ "productId": "not-a-uuid" });
        let event = DomainEvent::from_parts(PRODUCT_VIEW, payload);
        assert!(matches!(event, DomainEvent::Unknown { .. }));
        assert_eq!(event.event_type(), PRODUCT_VIEW);
    }

    #[test]
    fn test_session_start_accepts_empty_payload() {
        let event = DomainEvent::from_parts(SESSION_START, serde_json::json!({}));
        assert_eq!(
            event,
            DomainEvent::SessionStart(SessionStarted { session_id: None })
        );
    }

    #[test]
    fn test_telemetry_is_stored_in_wire_shape() {
        let product_id = Uuid::new_v4();
        let wire = serde_json::json!({
            "eventType": "ADD_TO_CART",
            "payload": { "productId": product_id, "quantity": 2 }
        });
        let telemetry: stall_sdk::objects::TelemetryEvent =
            serde_json::from_value(wire.clone()).unwrap();
        let event = DomainEvent::from(telemetry);
        assert_eq!(event.event_type(), ADD_TO_CART);
        assert_eq!(event.payload().unwrap(), wire["payload"]);
    }
}
