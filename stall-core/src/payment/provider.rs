//! Payment provider client.
//!
//! The provider exposes a transaction verification endpoint:
//!
//! ```text
//! GET {base_url}/transaction/verify/{reference}
//! Authorization: Bearer {store secret}
//! ```
//!
//! answering with
//!
//! ```json
//! {"status": true, "data": {"status": "success", "amount": 100000,
//!  "metadata": {"order_id": "..."}}}
//! ```
//!
//! where `amount` is in minor units.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider request timed out")]
    Timeout,

    #[error("provider answered with status {status}")]
    Status { status: u16, raw: Value },

    #[error("provider response could not be decoded: {0}")]
    Decode(String),

    #[error("provider base URL cannot carry a path")]
    InvalidBaseUrl,
}

impl ProviderError {
    /// The provider's document, when one was received.
    pub fn raw(&self) -> Option<&Value> {
        match self {
            ProviderError::Status { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// A provider's verdict on one transaction reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderVerification {
    pub succeeded: bool,
    /// Charged amount in minor units, if reported.
    pub amount_minor: Option<i64>,
    /// Order id the checkout attached to the transaction metadata.
    pub metadata_order_id: Option<Uuid>,
    /// The untouched provider document.
    pub raw: Value,
}

impl ProviderVerification {
    /// Interpret a verification document.
    pub fn from_document(raw: Value) -> Self {
        let data = raw.get("data");
        let succeeded = raw.get("status").and_then(Value::as_bool) == Some(true)
            && data
                .and_then(|data| data.get("status"))
                .and_then(Value::as_str)
                == Some("success");
        let amount_minor = data
            .and_then(|data| data.get("amount"))
            .and_then(Value::as_i64);
        let metadata_order_id = data
            .and_then(|data| data.get("metadata"))
            .and_then(|metadata| metadata.get("order_id"))
            .and_then(Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok());
        Self {
            succeeded,
            amount_minor,
            metadata_order_id,
            raw,
        }
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn verify_transaction(
        &self,
        secret: &str,
        reference: &str,
    ) -> Result<ProviderVerification, ProviderError>;
}

/// HTTP client for the provider's verification API.
#[derive(Debug, Clone)]
pub struct HttpPaymentProvider {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpPaymentProvider {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn verify_url(&self, reference: &str) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidBaseUrl)?
            .pop_if_empty()
            .extend(["transaction", "verify", reference]);
        Ok(url)
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn verify_transaction(
        &self,
        secret: &str,
        reference: &str,
    ) -> Result<ProviderVerification, ProviderError> {
        let url = self.verify_url(reference)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(secret)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Request(e)
                }
            })?;

        let status = response.status();
        let body = response.text().await?;
        let raw = serde_json::from_str::<Value>(&body);

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                raw: raw.unwrap_or(Value::String(body)),
            });
        }
        let raw = raw.map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(ProviderVerification::from_document(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubHttp;
    use serde_json::json;

    fn provider(stub: &StubHttp, timeout: Duration) -> HttpPaymentProvider {
        HttpPaymentProvider::new(stub.url.clone(), timeout).unwrap()
    }

    #[test]
    fn test_successful_document() {
        let order_id = Uuid::new_v4();
        let verification = ProviderVerification::from_document(json!({
            "status": true,
            "message": "Verification successful",
            "data": {
                "status": "success",
                "reference": "ref_1",
                "amount": 100000,
                "metadata": { "order_id": order_id.to_string() }
            }
        }));
        assert!(verification.succeeded);
        assert_eq!(verification.amount_minor, Some(100000));
        assert_eq!(verification.metadata_order_id, Some(order_id));
    }

    #[test]
    fn test_failed_or_partial_documents() {
        let failed = ProviderVerification::from_document(json!({
            "status": true,
            "data": { "status": "failed", "amount": 100 }
        }));
        assert!(!failed.succeeded);

        let rejected = ProviderVerification::from_document(json!({
            "status": false,
            "message": "Transaction reference not found"
        }));
        assert!(!rejected.succeeded);
        assert_eq!(rejected.amount_minor, None);
        assert_eq!(rejected.metadata_order_id, None);
    }

    #[test]
    fn test_verify_url_encodes_reference() {
        let provider = HttpPaymentProvider::new(
            Url::parse("https://api.example.com/v1/").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();
        let url = provider.verify_url("ref/../1 2").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/transaction/verify/ref%2F..%2F1%202"
        );
    }

    #[tokio::test]
    async fn test_verification_request() {
        let stub = StubHttp::start(
            200,
            r#"{"status":true,"data":{"status":"success","amount":2500}}"#,
            Duration::ZERO,
        )
        .await;

        let verification = provider(&stub, Duration::from_secs(5))
            .verify_transaction("sk_test_store", "ref_1")
            .await
            .unwrap();
        assert!(verification.succeeded);
        assert_eq!(verification.amount_minor, Some(2500));

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        let request = requests[0].to_lowercase();
        assert!(request.starts_with("get /transaction/verify/ref_1 "));
        assert!(request.contains("authorization: bearer sk_test_store"));
    }

    #[tokio::test]
    async fn test_error_status_keeps_provider_document() {
        let stub = StubHttp::start(
            502,
            r#"{"status":false,"message":"upstream unavailable"}"#,
            Duration::ZERO,
        )
        .await;

        let err = provider(&stub, Duration::from_secs(5))
            .verify_transaction("sk_test_store", "ref_1")
            .await
            .unwrap_err();
        match &err {
            ProviderError::Status { status, raw } => {
                assert_eq!(*status, 502);
                assert_eq!(raw["message"], "upstream unavailable");
            }
            other => panic!("expected status error, got {other:?}"),
        }
        assert!(err.raw().is_some());
    }

    #[tokio::test]
    async fn test_error_status_with_plain_body() {
        let stub = StubHttp::start(404, "not found", Duration::ZERO).await;

        let err = provider(&stub, Duration::from_secs(5))
            .verify_transaction("sk_test_store", "ref_1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Status { status: 404, raw: Value::String(ref body) } if body == "not found"
        ));
    }

    #[tokio::test]
    async fn test_undecodable_success_body() {
        let stub = StubHttp::start(200, "<html>ok</html>", Duration::ZERO).await;

        let err = provider(&stub, Duration::from_secs(5))
            .verify_transaction("sk_test_store", "ref_1")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
        assert!(err.raw().is_none());
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let stub = StubHttp::start(200, "{}", Duration::from_secs(2)).await;

        let err = provider(&stub, Duration::from_millis(100))
            .verify_transaction("sk_test_store", "ref_1")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout));
    }
}
