//! Request authentication extractors.
//!
//! - `BuyerSession`: buyer id asserted by the upstream session layer via
//!   `Stall-Buyer-Id` and `Stall-Signature` (buyer routes).
//! - `SellerAuth`: plaintext admin secret in `Stall-Admin-Authorization`,
//!   checked against the configured argon2 hash (seller routes).
//!
//! All cryptographic operations are delegated to [`stall_sdk::signature`]
//! and [`stall_core::config::AdminConfig`].

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use stall_sdk::signature::{
    self, ADMIN_AUTH_HEADER, BUYER_ID_HEADER, SIGNATURE_HEADER, SignatureError,
};
use uuid::Uuid;

use crate::state::AppState;

/// An authenticated buyer.
#[derive(Debug, Clone, Copy)]
pub struct BuyerSession {
    pub buyer_id: Uuid,
}

#[derive(Debug)]
pub enum BuyerSessionError {
    MissingBuyerId,
    MissingSignature,
    InvalidHeader,
    InvalidBase64,
    SignatureMismatch,
    Expired,
}

impl From<SignatureError> for BuyerSessionError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::InvalidFormat => Self::InvalidHeader,
            SignatureError::InvalidBase64 => Self::InvalidBase64,
            SignatureError::SignatureMismatch => Self::SignatureMismatch,
            SignatureError::Expired => Self::Expired,
        }
    }
}

impl IntoResponse for BuyerSessionError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            BuyerSessionError::MissingBuyerId => {
                (StatusCode::UNAUTHORIZED, "missing Stall-Buyer-Id header")
            }
            BuyerSessionError::MissingSignature => {
                (StatusCode::UNAUTHORIZED, "missing Stall-Signature header")
            }
            BuyerSessionError::InvalidHeader => (StatusCode::BAD_REQUEST, "invalid header format"),
            BuyerSessionError::InvalidBase64 => {
                (StatusCode::BAD_REQUEST, "invalid signature encoding")
            }
            BuyerSessionError::SignatureMismatch => {
                (StatusCode::UNAUTHORIZED, "signature verification failed")
            }
            BuyerSessionError::Expired => (StatusCode::UNAUTHORIZED, "signature expired"),
        };
        (status, message).into_response()
    }
}

impl FromRequestParts<AppState> for BuyerSession {
    type Rejection = BuyerSessionError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let buyer_id = parts
            .headers
            .get(BUYER_ID_HEADER)
            .ok_or(BuyerSessionError::MissingBuyerId)?
            .to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value).ok())
            .ok_or(BuyerSessionError::InvalidHeader)?;

        let sig_value = parts
            .headers
            .get(SIGNATURE_HEADER)
            .ok_or(BuyerSessionError::MissingSignature)?
            .to_str()
            .map_err(|_| BuyerSessionError::InvalidHeader)?;
        let (timestamp, signature_bytes) = signature::parse_signature_header(sig_value)?;

        signature::verify_buyer_session(
            buyer_id,
            timestamp,
            &signature_bytes,
            state.config.session.secret_bytes(),
        )?;
        Ok(BuyerSession { buyer_id })
    }
}

/// An authenticated seller.
pub struct SellerAuth;

#[derive(Debug)]
pub enum SellerAuthError {
    MissingHeader,
    InvalidSecret,
}

impl IntoResponse for SellerAuthError {
    fn into_response(self) -> Response {
        match self {
            SellerAuthError::MissingHeader => {
                (StatusCode::UNAUTHORIZED, "missing Stall-Admin-Authorization header")
                    .into_response()
            }
            SellerAuthError::InvalidSecret => {
                (StatusCode::UNAUTHORIZED, "invalid admin secret").into_response()
            }
        }
    }
}

impl FromRequestParts<AppState> for SellerAuth {
    type Rejection = SellerAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .ok_or(SellerAuthError::MissingHeader)?
            .to_str()
            .map_err(|_| SellerAuthError::InvalidSecret)?;

        let admin = state.config.admin().await;
        if admin.verify_secret(presented) {
            Ok(SellerAuth)
        } else {
            tracing::warn!("Rejected seller request with invalid admin secret");
            Err(SellerAuthError::InvalidSecret)
        }
    }
}
