//! Error taxonomy shared by the engine components.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by persistence processors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Event payload could not be encoded
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A uniqueness constraint rejected the write
    #[error("conflicting write: {0}")]
    Conflict(String),

    /// Failure injected by the in-memory store
    #[error("injected failure: {0}")]
    Injected(&'static str),
}

impl StoreError {
    /// Map unique-constraint violations to [`StoreError::Conflict`].
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_owned())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Errors surfaced by the order, payment, inventory and analytics services.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// A referenced store, buyer, order or product does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// The request collides with the current state
    #[error("conflict: {0}")]
    Conflict(String),

    /// Missing or unusable payment credentials
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The payment provider failed or declined the verification.
    ///
    /// `provider` carries the provider's raw document when one was received.
    #[error("payment verification failed, please retry: {reason}")]
    ExternalService {
        reason: String,
        provider: Option<serde_json::Value>,
    },

    /// Malformed input
    #[error("validation error: {0}")]
    Validation(String),

    /// Persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CommerceError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        CommerceError::NotFound { entity, id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CommerceError::Validation(message.into())
    }
}
