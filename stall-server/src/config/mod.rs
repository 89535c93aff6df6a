//! Configuration module for stall-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles admin secret hashing.

pub mod file;

use crate::config::file::FileConfig;
use stall_core::config::{
    AdminConfig, NotificationConfig, OrdersConfig, PaymentProviderConfig, ServerConfig,
    SessionConfig, SharedConfig,
};
use stall_sdk::credential::{CredentialCipher, CredentialError};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("credential key error: {0}")]
    Credential(#[from] CredentialError),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub session: SessionConfig,
    pub cipher: CredentialCipher,
    pub payment_provider: PaymentProviderConfig,
    pub orders: OrdersConfig,
    pub notifications: NotificationConfig,
}

impl LoadedConfig {
    /// Split into the shared runtime configuration and the credential cipher.
    pub fn into_shared(self) -> (SharedConfig, CredentialCipher) {
        let shared = SharedConfig {
            server: self.server,
            admin: Arc::new(RwLock::new(self.admin)),
            session: self.session,
            payment_provider: self.payment_provider,
            orders: self.orders,
            notifications: self.notifications,
        };
        (shared, self.cipher)
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read, validate, and hash the admin secret if it is still plaintext
    /// (rewriting the file in that case).
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let mut file_config = self.read_file()?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }
        validate(&file_config)?;

        let secret_hash = self.ensure_hashed(&mut file_config)?;
        build_loaded_config(file_config, secret_hash)
    }

    /// Re-read the admin section (used during SIGHUP).
    ///
    /// Everything else is fixed for the lifetime of the process.
    pub fn reload_admin(&self) -> Result<AdminConfig, ConfigError> {
        let mut file_config = self.read_file()?;
        let secret_hash = self.ensure_hashed(&mut file_config)?;
        Ok(AdminConfig::new(secret_hash))
    }

    fn read_file(&self) -> Result<FileConfig, ConfigError> {
        let content = std::fs::read_to_string(&self.config_path)?;
        Ok(toml::from_str(&content)?)
    }

    fn ensure_hashed(&self, file_config: &mut FileConfig) -> Result<String, ConfigError> {
        if file_config.is_admin_secret_hashed() {
            return Ok(file_config.admin.secret.clone());
        }
        if file_config.admin.secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "admin secret must not be empty".into(),
            ));
        }
        let hash = hash_secret(&file_config.admin.secret)?;
        file_config.admin.secret = hash.clone();
        self.rewrite_config(file_config)?;
        tracing::info!("Admin secret hashed and config file updated");
        Ok(hash)
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write to a temp file, then rename over the original.
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.session.secret.len() < 16 {
        return Err(ConfigError::ValidationError(
            "session secret must be at least 16 bytes".into(),
        ));
    }
    if config.credentials.master_key.is_empty() || config.credentials.salt.is_empty() {
        return Err(ConfigError::ValidationError(
            "credentials master_key and salt must be set".into(),
        ));
    }
    if config.payment_provider.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "payment_provider timeout_secs must be positive".into(),
        ));
    }
    if config.orders.sweep_batch <= 0 || config.orders.sweep_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "orders sweep_batch and sweep_interval_secs must be positive".into(),
        ));
    }
    Ok(())
}

fn hash_secret(plaintext: &str) -> Result<String, ConfigError> {
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ConfigError::HashError(e.to_string()))
}

fn build_loaded_config(
    file_config: FileConfig,
    secret_hash: String,
) -> Result<LoadedConfig, ConfigError> {
    let cipher = CredentialCipher::derive(
        file_config.credentials.master_key.as_bytes(),
        file_config.credentials.salt.as_bytes(),
    )?;
    let orders = file_config.orders;

    Ok(LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        admin: AdminConfig::new(secret_hash),
        session: SessionConfig::new(file_config.session.secret.into_bytes()),
        cipher,
        payment_provider: PaymentProviderConfig {
            base_url: file_config.payment_provider.base_url,
            timeout: Duration::from_secs(file_config.payment_provider.timeout_secs),
        },
        orders: OrdersConfig {
            pending_ttl: Duration::from_secs(orders.pending_ttl_secs),
            sweep_interval: Duration::from_secs(orders.sweep_interval_secs),
            sweep_batch: orders.sweep_batch,
        },
        notifications: NotificationConfig {
            webhook_url: file_config.notifications.webhook_url,
        },
    })
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
