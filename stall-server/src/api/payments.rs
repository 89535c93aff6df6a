//! Payment verification.
//!
//! Unauthenticated. The reference is checked against the provider with the
//! store's own secret, and settles an order only when the provider metadata
//! names that order and the paid amount equals its total. A reference
//! already recorded on another order of the store is refused.

use axum::{Json, Router, extract::State, routing::post};
use stall_sdk::objects::{OrderResponse, VerifyPaymentRequest, VerifyPaymentResponse};

use super::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/verify", post(verify_payment))
}

/// `POST /payments/verify`
async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, ApiError> {
    let verification = state.payments.verify(request).await?;
    Ok(Json(VerifyPaymentResponse {
        verified: true,
        order: Some(OrderResponse::from(&verification.order.order)),
        provider: verification.provider,
    }))
}
