//! Buyer session assertions.
//!
//! Session issuance lives outside Stall. The upstream session layer
//! forwards the authenticated buyer id together with an HMAC-SHA256
//! assertion so the checkout API can trust it without a session store:
//!
//! ```text
//! Stall-Buyer-Id:  {buyer_uuid}
//! Stall-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! The signature is `HMAC-SHA256("{buyer_uuid}.{timestamp}", session_secret)`.

use uuid::Uuid;

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "Stall-Signature";

/// Header name carrying the authenticated buyer id.
pub const BUYER_ID_HEADER: &str = "Stall-Buyer-Id";

/// Header name for seller API authentication (plaintext secret).
pub const ADMIN_AUTH_HEADER: &str = "Stall-Admin-Authorization";

/// Maximum allowed age of a signature (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

// ---------------------------------------------------------------------------
// Header parsing / formatting
// ---------------------------------------------------------------------------

/// Parse a `Stall-Signature` header value (`{timestamp}.{base64}`) into
/// `(timestamp, raw_signature_bytes)`.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let (timestamp, encoded) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature_bytes = fast32::base64::RFC4648_NOPAD
        .decode_str(encoded)
        .map_err(|_| SignatureError::InvalidBase64)?
        .into_boxed_slice();
    Ok((timestamp, signature_bytes))
}

/// Format a `{timestamp}.{base64}` header value from its parts.
pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!(
        "{}.{}",
        timestamp,
        fast32::base64::RFC4648_NOPAD.encode(signature)
    )
}

/// Check that a signature timestamp is within [`MAX_SIGNATURE_AGE`].
pub fn check_timestamp(timestamp: i64) -> Result<(), SignatureError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if now - timestamp > MAX_SIGNATURE_AGE {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Buyer session signing
// ---------------------------------------------------------------------------

fn session_key(key: &[u8]) -> ring::hmac::Key {
    ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key)
}

/// Sign a buyer id at `timestamp`.
///
/// Returns the formatted `Stall-Signature` header value.
pub fn sign_buyer_session_at(buyer_id: Uuid, timestamp: i64, key: &[u8]) -> String {
    let data = format!("{buyer_id}.{timestamp}");
    let sig = ring::hmac::sign(&session_key(key), data.as_bytes());
    format_signature_header(timestamp, sig.as_ref())
}

/// Sign a buyer id with the current time.
pub fn sign_buyer_session(buyer_id: Uuid, key: &[u8]) -> String {
    let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
    sign_buyer_session_at(buyer_id, timestamp, key)
}

/// Verify a buyer session assertion.
///
/// Checks `HMAC-SHA256("{buyer_id}.{timestamp}", key)` and timestamp freshness.
pub fn verify_buyer_session(
    buyer_id: Uuid,
    timestamp: i64,
    signature: &[u8],
    key: &[u8],
) -> Result<(), SignatureError> {
    let data = format!("{buyer_id}.{timestamp}");
    ring::hmac::verify(&session_key(key), data.as_bytes(), signature)?;
    check_timestamp(timestamp)?;
    Ok(())
}
