//! Payment verification gateway.
//!
//! Confirms a transaction reference with the provider using the store's own
//! credentials, then drives the order to PAID. A reference settles only the
//! order named in its metadata, and only for the order's full total.
//! Repeated verifications of the same reference are absorbed by the order
//! transition guard, so the gateway itself keeps no state.

pub mod provider;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::Value;
use stall_sdk::credential::CredentialCipher;
use stall_sdk::objects::VerifyPaymentRequest;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order_records::GetOrderById;
use crate::entities::stores::{GetStoreById, SetStorePaymentSecret, StoreRecord};
use crate::error::CommerceError;
use crate::framework::CommerceStore;
use crate::lifecycle::{OrderLifecycle, OrderView};

pub use provider::{HttpPaymentProvider, PaymentProvider, ProviderError, ProviderVerification};

/// Default bound on a provider round trip.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// The provider reports minor units; the order total is in major units.
fn check_amount(
    verification: &ProviderVerification,
    total_amount: Decimal,
    order_id: Uuid,
) -> Result<(), CommerceError> {
    let expected = total_amount * Decimal::ONE_HUNDRED;
    match verification.amount_minor {
        Some(amount_minor) if Decimal::from(amount_minor) == expected => Ok(()),
        Some(amount_minor) => {
            warn!(
                order_id = %order_id,
                provider_amount_minor = amount_minor,
                order_total = %total_amount,
                "Provider amount does not match order total"
            );
            Err(CommerceError::Conflict(format!(
                "paid amount {amount_minor} does not match order total {expected}"
            )))
        }
        None => Err(CommerceError::ExternalService {
            reason: "provider did not report the paid amount".to_owned(),
            provider: Some(verification.raw.clone()),
        }),
    }
}

/// A verified payment and the resulting order state.
#[derive(Debug, Clone)]
pub struct PaymentVerification {
    pub order: OrderView,
    /// The provider's verification document, untouched.
    pub provider: Value,
}

#[derive(Clone)]
pub struct PaymentGateway<S> {
    store: S,
    provider: Arc<dyn PaymentProvider>,
    cipher: Arc<CredentialCipher>,
    lifecycle: OrderLifecycle<S>,
    timeout: Duration,
}

impl<S: CommerceStore> PaymentGateway<S> {
    pub fn new(
        store: S,
        provider: Arc<dyn PaymentProvider>,
        cipher: Arc<CredentialCipher>,
        lifecycle: OrderLifecycle<S>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            cipher,
            lifecycle,
            timeout,
        }
    }

    async fn load_store(&self, store_id: Uuid) -> Result<StoreRecord, CommerceError> {
        self.store
            .process(GetStoreById { store_id })
            .await?
            .ok_or_else(|| CommerceError::not_found("store", store_id))
    }

    /// Verify `request.reference` with the provider and mark the order PAID.
    ///
    /// Fails with [`CommerceError::Configuration`] before any network call
    /// when the store's credentials are missing or unreadable. Provider
    /// failures leave the order untouched.
    pub async fn verify(
        &self,
        request: VerifyPaymentRequest,
    ) -> Result<PaymentVerification, CommerceError> {
        let reference = request.reference.trim();
        if reference.is_empty() {
            return Err(CommerceError::validation("payment reference is required"));
        }

        let store = self.load_store(request.store_id).await?;
        let stored_secret = store
            .payment_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| {
                CommerceError::Configuration(format!(
                    "store {} has no payment provider secret",
                    store.id
                ))
            })?;
        let secret = self.cipher.decrypt(stored_secret).map_err(|e| {
            CommerceError::Configuration(format!(
                "payment provider secret of store {} is unusable: {e}",
                store.id
            ))
        })?;
        if secret.is_legacy() {
            warn!(store_id = %store.id, "Payment provider secret is stored unencrypted");
        }

        let verification = match tokio::time::timeout(
            self.timeout,
            self.provider.verify_transaction(secret.expose(), reference),
        )
        .await
        {
            Err(_) => {
                warn!(store_id = %store.id, reference = %reference, "Payment provider timed out");
                return Err(CommerceError::ExternalService {
                    reason: ProviderError::Timeout.to_string(),
                    provider: None,
                });
            }
            Ok(Err(err)) => {
                warn!(store_id = %store.id, reference = %reference, error = %err, "Payment provider call failed");
                return Err(CommerceError::ExternalService {
                    reason: err.to_string(),
                    provider: err.raw().cloned(),
                });
            }
            Ok(Ok(verification)) => verification,
        };

        if !verification.succeeded {
            info!(store_id = %store.id, reference = %reference, "Provider reports transaction as not successful");
            return Err(CommerceError::ExternalService {
                reason: "transaction was not successful".to_owned(),
                provider: Some(verification.raw),
            });
        }

        let order_id = request
            .order_id
            .or(verification.metadata_order_id)
            .ok_or_else(|| {
                CommerceError::validation("no order id given and none found in provider metadata")
            })?;
        let detail = self
            .store
            .process(GetOrderById { order_id })
            .await?
            .filter(|detail| detail.order.store_id == store.id)
            .ok_or_else(|| CommerceError::not_found("order", order_id))?;

        if let Some(bound) = verification.metadata_order_id {
            if bound != order_id {
                warn!(
                    order_id = %order_id,
                    reference_order_id = %bound,
                    reference = %reference,
                    "Payment reference belongs to another order"
                );
                return Err(CommerceError::Conflict(format!(
                    "payment reference {reference} was issued for another order"
                )));
            }
        }
        check_amount(&verification, detail.order.total_amount, order_id)?;

        let view = self.lifecycle.confirm_payment(order_id, reference).await?;

        info!(
            order_id = %order_id,
            reference = %reference,
            applied = view.changed,
            "Payment verified"
        );

        Ok(PaymentVerification {
            order: view,
            provider: verification.raw,
        })
    }

    /// Encrypt and store a store's provider secret.
    pub async fn set_store_secret(&self, store_id: Uuid, secret: &str) -> Result<(), CommerceError> {
        if secret.trim().is_empty() {
            return Err(CommerceError::validation("payment secret cannot be empty"));
        }
        let encrypted = self
            .cipher
            .encrypt(secret)
            .map_err(|e| CommerceError::Configuration(format!("cannot encrypt secret: {e}")))?;
        let updated = self
            .store
            .process(SetStorePaymentSecret {
                store_id,
                encrypted,
            })
            .await?;
        if !updated {
            return Err(CommerceError::not_found("store", store_id));
        }
        info!(store_id = %store_id, "Payment provider secret updated");
        Ok(())
    }
}
