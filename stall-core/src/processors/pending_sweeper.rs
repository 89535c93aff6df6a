//! PendingSweeper processor.
//!
//! Periodically cancels PENDING orders whose last checkout attempt is older
//! than the configured TTL. Each sweep is bounded by `sweep_batch`; a full
//! batch triggers another sweep right away.

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::OrdersConfig;
use crate::framework::CommerceStore;
use crate::lifecycle::OrderLifecycle;

pub struct PendingSweeper<S> {
    lifecycle: OrderLifecycle<S>,
    config: OrdersConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl<S: CommerceStore> PendingSweeper<S> {
    pub fn new(
        lifecycle: OrderLifecycle<S>,
        config: OrdersConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            lifecycle,
            config,
            shutdown_rx,
        }
    }

    pub async fn run(mut self) {
        info!(
            ttl_secs = self.config.pending_ttl.as_secs(),
            interval_secs = self.config.sweep_interval.as_secs(),
            "PendingSweeper started"
        );
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("PendingSweeper received shutdown signal");
                        break;
                    }
                }

                _ = interval.tick() => {
                    self.sweep().await;
                }
            }
        }

        info!("PendingSweeper shutdown complete");
    }

    /// Sweep until a batch comes back short. Returns the number cancelled.
    pub async fn sweep(&self) -> usize {
        let mut total = 0;
        loop {
            match self
                .lifecycle
                .cancel_stale(self.config.pending_ttl, self.config.sweep_batch)
                .await
            {
                Ok(cancelled) => {
                    total += cancelled.len();
                    if cancelled.is_empty() || (cancelled.len() as i64) < self.config.sweep_batch {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to cancel stale pending orders");
                    break;
                }
            }
        }
        debug!(cancelled = total, "Pending order sweep finished");
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::OrderStatus;
    use crate::testing::{Fixture, cart};
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sweep_drains_in_batches() {
        let fx = Fixture::new().await;
        let a = fx.product_priced(100, 10).await;
        let lifecycle = fx.lifecycle();

        let mut stale = Vec::new();
        for _ in 0..3 {
            let buyer = Uuid::new_v4();
            fx.memory
                .insert_buyer(crate::entities::stores::BuyerRecord {
                    id: buyer,
                    tenant_id: fx.tenant_id,
                    email: None,
                })
                .await;
            let id = lifecycle
                .create(buyer, cart(fx.store_id, 100, &[(a, 1, 100)]))
                .await
                .unwrap()
                .order
                .order
                .id;
            fx.memory.age_order(id, time::Duration::hours(3)).await;
            stale.push(id);
        }
        let fresh = lifecycle
            .create(fx.buyer_id, cart(fx.store_id, 100, &[(a, 1, 100)]))
            .await
            .unwrap()
            .order
            .order
            .id;

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = PendingSweeper::new(
            lifecycle,
            OrdersConfig {
                pending_ttl: Duration::from_secs(60 * 60),
                sweep_interval: Duration::from_secs(60),
                sweep_batch: 2,
            },
            shutdown_rx,
        );

        assert_eq!(sweeper.sweep().await, 3);
        for id in stale {
            assert_eq!(
                fx.memory.order(id).await.unwrap().order.status,
                OrderStatus::Cancelled
            );
        }
        assert_eq!(
            fx.memory.order(fresh).await.unwrap().order.status,
            OrderStatus::Pending
        );
        assert_eq!(sweeper.sweep().await, 0);
    }
}
