//! NotificationDispatcher processor.
//!
//! Receives `OrderNotice::Confirmed` after a PAID transition commits,
//! re-reads the order, and posts an `order_confirmed` document to the
//! configured webhook. Without a webhook URL the confirmation is only
//! logged. Delivery failures are logged and never reach the order.

use std::time::Duration;

use stall_sdk::objects::{OrderConfirmation, OrderResponse};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::NotificationConfig;
use crate::entities::order_records::{GetOrderById, OrderDetail};
use crate::entities::stores::{BuyerRecord, GetBuyerById, GetStoreById, StoreRecord};
use crate::error::StoreError;
use crate::events::{OrderNotice, OrderNoticeReceiver};
use crate::framework::CommerceStore;

pub const ORDER_CONFIRMED: &str = "order_confirmed";

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("store not found: {0}")]
    StoreNotFound(Uuid),

    #[error("webhook delivery failed with status {status}: {body}")]
    DeliveryFailed { status: u16, body: String },
}

/// What happened to one confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// No webhook is configured.
    Logged,
    /// Handed to a delivery task.
    Queued,
}

/// Build the webhook document for a paid order.
pub fn confirmation(
    detail: &OrderDetail,
    store: &StoreRecord,
    buyer: Option<&BuyerRecord>,
) -> OrderConfirmation {
    OrderConfirmation {
        event: ORDER_CONFIRMED.to_owned(),
        store_name: store.name.clone(),
        buyer_email: buyer.and_then(|buyer| buyer.email.clone()),
        order: OrderResponse::from(detail),
        timestamp: time::OffsetDateTime::now_utc().unix_timestamp(),
    }
}

pub struct NotificationDispatcher<S> {
    store: S,
    config: NotificationConfig,
    notice_rx: OrderNoticeReceiver,
    shutdown_rx: watch::Receiver<bool>,
    http_client: reqwest::Client,
}

impl<S: CommerceStore> NotificationDispatcher<S> {
    pub fn new(
        store: S,
        config: NotificationConfig,
        notice_rx: OrderNoticeReceiver,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self, DispatchError> {
        let http_client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;
        Ok(Self {
            store,
            config,
            notice_rx,
            shutdown_rx,
            http_client,
        })
    }

    pub async fn run(mut self) {
        info!(
            webhook = self.config.webhook_url.is_some(),
            "NotificationDispatcher started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("NotificationDispatcher received shutdown signal");
                        break;
                    }
                }

                Some(notice) = self.notice_rx.recv() => {
                    debug!(notice = ?notice, "Received OrderNotice");
                    if let Err(e) = self.dispatch(notice).await {
                        error!(error = %e, "Failed to dispatch order notification");
                    }
                }

                else => {
                    info!("OrderNotice channel closed");
                    break;
                }
            }
        }

        info!("NotificationDispatcher shutdown complete");
    }

    /// Handle one notice.
    pub async fn dispatch(&self, notice: OrderNotice) -> Result<Dispatch, DispatchError> {
        let order_id = notice.order_id();
        let detail = self
            .store
            .process(GetOrderById { order_id })
            .await?
            .ok_or(DispatchError::OrderNotFound(order_id))?;
        let store_id = detail.order.store_id;
        let store = self
            .store
            .process(GetStoreById { store_id })
            .await?
            .ok_or(DispatchError::StoreNotFound(store_id))?;
        let buyer = self
            .store
            .process(GetBuyerById {
                buyer_id: detail.order.buyer_id,
            })
            .await?;

        let document = confirmation(&detail, &store, buyer.as_ref());

        let Some(url) = self.config.webhook_url.clone() else {
            info!(
                order_id = %order_id,
                store = %document.store_name,
                buyer_email = ?document.buyer_email,
                total = %document.order.total_amount,
                "Order confirmed"
            );
            return Ok(Dispatch::Logged);
        };

        let client = self.http_client.clone();
        tokio::spawn(async move {
            deliver(client, url, order_id, document).await;
        });
        Ok(Dispatch::Queued)
    }
}

/// One delivery attempt. Failures are logged and dropped.
async fn deliver(client: reqwest::Client, url: Url, order_id: Uuid, document: OrderConfirmation) {
    match post(&client, &url, &document).await {
        Ok(()) => info!(order_id = %order_id, "Order confirmation delivered"),
        Err(e) => warn!(order_id = %order_id, error = %e, "Order confirmation delivery failed"),
    }
}

async fn post(
    client: &reqwest::Client,
    url: &Url,
    document: &OrderConfirmation,
) -> Result<(), DispatchError> {
    let response = client.post(url.clone()).json(document).send().await?;
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(DispatchError::DeliveryFailed {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProcessor;
    use crate::testing::{Fixture, StubHttp, cart};

    fn dispatcher(fx: &Fixture) -> NotificationDispatcher<MemoryProcessor> {
        let (_tx, rx) = crate::events::order_notice_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        NotificationDispatcher::new(
            fx.memory.clone(),
            NotificationConfig::default(),
            rx,
            shutdown_rx,
        )
        .unwrap()
    }

    async fn paid_order(fx: &Fixture) -> Uuid {
        let a = fx.product_priced(500, 4).await;
        let lifecycle = fx.lifecycle();
        let order_id = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 500, &[(a, 1, 500)]))
            .await
            .unwrap()
            .order
            .order
            .id;
        lifecycle.confirm_payment(order_id, "ref_1").await.unwrap();
        order_id
    }

    #[tokio::test]
    async fn test_failed_delivery_is_attempted_once() {
        let fx = Fixture::new().await;
        let order_id = paid_order(&fx).await;
        let webhook = StubHttp::start(503, r#"{"error":"unavailable"}"#, Duration::ZERO).await;

        let detail = fx.memory.order(order_id).await.unwrap();
        let store = fx.memory.store(fx.store_id).await.unwrap();
        let document = confirmation(&detail, &store, None);
        deliver(
            reqwest::Client::new(),
            webhook.url.clone(),
            order_id,
            document,
        )
        .await;

        let requests = webhook.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("POST / "));
        assert!(requests[0].contains(ORDER_CONFIRMED));
    }

    #[tokio::test]
    async fn test_confirmation_with_webhook_is_posted() {
        let fx = Fixture::new().await;
        let order_id = paid_order(&fx).await;
        let webhook = StubHttp::start(200, "{}", Duration::ZERO).await;

        let (_tx, rx) = crate::events::order_notice_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = NotificationDispatcher::new(
            fx.memory.clone(),
            NotificationConfig {
                webhook_url: Some(webhook.url.clone()),
            },
            rx,
            shutdown_rx,
        )
        .unwrap();

        let outcome = dispatcher
            .dispatch(OrderNotice::Confirmed { order_id })
            .await
            .unwrap();
        assert_eq!(outcome, Dispatch::Queued);

        for _ in 0..100 {
            if !webhook.requests().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let requests = webhook.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].contains(&order_id.to_string()));
    }

    #[tokio::test]
    async fn test_confirmation_without_webhook_is_logged() {
        let fx = Fixture::new().await;
        let order_id = paid_order(&fx).await;

        let outcome = dispatcher(&fx)
            .dispatch(OrderNotice::Confirmed { order_id })
            .await
            .unwrap();
        assert_eq!(outcome, Dispatch::Logged);
    }

    #[tokio::test]
    async fn test_confirmation_document() {
        let fx = Fixture::new().await;
        let a = fx.product_priced(500, 4).await;
        let lifecycle = fx.lifecycle();
        let order_id = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 1000, &[(a, 2, 500)]))
            .await
            .unwrap()
            .order
            .order
            .id;
        lifecycle.confirm_payment(order_id, "ref_9").await.unwrap();

        let detail = fx.memory.order(order_id).await.unwrap();
        let store = fx.memory.store(fx.store_id).await.unwrap();
        let buyer = BuyerRecord {
            id: fx.buyer_id,
            tenant_id: fx.tenant_id,
            email: Some("buyer@example.com".into()),
        };
        let document = confirmation(&detail, &store, Some(&buyer));
        let json = serde_json::to_value(&document).unwrap();
        assert_eq!(json["event"], ORDER_CONFIRMED);
        assert_eq!(json["storeName"], "Fixture Store");
        assert_eq!(json["buyerEmail"], "buyer@example.com");
        assert_eq!(json["order"]["orderId"], order_id.to_string());
        assert_eq!(json["order"]["status"], "PAID");
        assert_eq!(json["order"]["paymentRef"], "ref_9");
        assert_eq!(json["order"]["items"][0]["quantity"], 2);
    }

    #[tokio::test]
    async fn test_unknown_order_is_an_error() {
        let fx = Fixture::new().await;
        let err = dispatcher(&fx)
            .dispatch(OrderNotice::Confirmed {
                order_id: Uuid::new_v4(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::OrderNotFound(_)));
    }
}
