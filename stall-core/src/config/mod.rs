//! Validated runtime configuration.
//!
//! The server crate parses and validates the TOML file into these types;
//! the engine only ever sees the result. Only the admin section can change
//! at runtime (on reload), so it is the only one behind a lock.

mod admin;

pub use admin::AdminConfig;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use url::Url;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

/// Key shared with the upstream session layer for buyer assertions.
#[derive(Clone)]
pub struct SessionConfig {
    pub secret: Box<[u8]>,
}

impl SessionConfig {
    pub fn new(secret: impl Into<Box<[u8]>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PaymentProviderConfig {
    /// Base URL of the provider API, e.g. `https://api.paystack.co`.
    pub base_url: Url,
    pub timeout: Duration,
}

/// Pending order housekeeping.
#[derive(Debug, Clone, Copy)]
pub struct OrdersConfig {
    /// PENDING orders idle for longer than this are cancelled.
    pub pending_ttl: Duration,
    pub sweep_interval: Duration,
    /// Upper bound of orders cancelled per sweep.
    pub sweep_batch: i64,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            pending_ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            sweep_batch: 100,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    /// Receiver of `order_confirmed` posts. Confirmations are only logged
    /// when unset.
    pub webhook_url: Option<Url>,
}

/// Configuration shared by the running server.
#[derive(Clone)]
pub struct SharedConfig {
    pub server: ServerConfig,
    pub admin: Arc<RwLock<AdminConfig>>,
    pub session: SessionConfig,
    pub payment_provider: PaymentProviderConfig,
    pub orders: OrdersConfig,
    pub notifications: NotificationConfig,
}

impl SharedConfig {
    pub async fn admin(&self) -> tokio::sync::RwLockReadGuard<'_, AdminConfig> {
        self.admin.read().await
    }

    /// Swap in a reloaded admin section.
    pub async fn replace_admin(&self, admin: AdminConfig) {
        *self.admin.write().await = admin;
    }
}
