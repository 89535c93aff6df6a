//! Application state shared across all request handlers.

use std::sync::Arc;

use sqlx::PgPool;
use stall_core::analytics::Analytics;
use stall_core::config::SharedConfig;
use stall_core::events::{OrderNoticeSender, StoreBroadcaster};
use stall_core::framework::DatabaseProcessor;
use stall_core::inventory::InventoryEngine;
use stall_core::lifecycle::OrderLifecycle;
use stall_core::payment::{HttpPaymentProvider, PaymentGateway, ProviderError};
use stall_sdk::credential::CredentialCipher;

/// Application state that is shared across all request handlers.
///
/// Cloning is cheap: every service holds its own handle to the pool.
#[derive(Clone)]
pub struct AppState {
    pub config: SharedConfig,
    pub db: DatabaseProcessor,
    pub broadcaster: StoreBroadcaster,
    pub lifecycle: OrderLifecycle<DatabaseProcessor>,
    pub inventory: InventoryEngine<DatabaseProcessor>,
    pub payments: PaymentGateway<DatabaseProcessor>,
    pub analytics: Analytics<DatabaseProcessor>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: SharedConfig,
        cipher: CredentialCipher,
        notices: OrderNoticeSender,
    ) -> Result<Self, ProviderError> {
        let db = DatabaseProcessor::new(pool);
        let broadcaster = StoreBroadcaster::default();
        let lifecycle = OrderLifecycle::new(db.clone(), notices, broadcaster.clone());
        let provider = HttpPaymentProvider::new(
            config.payment_provider.base_url.clone(),
            config.payment_provider.timeout,
        )?;
        let payments = PaymentGateway::new(
            db.clone(),
            Arc::new(provider),
            Arc::new(cipher),
            lifecycle.clone(),
            config.payment_provider.timeout,
        );

        Ok(Self {
            inventory: InventoryEngine::new(db.clone(), broadcaster.clone()),
            analytics: Analytics::new(db.clone(), broadcaster.clone()),
            config,
            db,
            broadcaster,
            lifecycle,
            payments,
        })
    }
}
