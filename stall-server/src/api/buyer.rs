//! Buyer API handlers.
//!
//! - `POST /orders`                – checkout a cart into the pending order
//! - `GET  /orders/{order_id}`     – fetch one of the buyer's orders
//! - `POST /orders/{order_id}/abandon` – record that checkout was left
//! - `POST /events`                – storefront telemetry

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use stall_sdk::objects::{CreateOrderRequest, OrderResponse, TrackEventRequest};
use uuid::Uuid;

use super::error::ApiError;
use super::extractors::BuyerSession;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{order_id}", get(get_order))
        .route("/orders/{order_id}/abandon", post(abandon_order))
        .route("/events", post(track_event))
}

async fn create_order(
    State(state): State<AppState>,
    session: BuyerSession,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.lifecycle.create(session.buyer_id, request).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&view.order))))
}

async fn get_order(
    State(state): State<AppState>,
    session: BuyerSession,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let view = state
        .lifecycle
        .get_for_buyer(session.buyer_id, order_id)
        .await?;
    Ok(Json(OrderResponse::from(&view.order)))
}

#[derive(Debug, Default, Deserialize)]
struct AbandonBody {
    #[serde(default)]
    reason: Option<String>,
}

/// Always answers 202. Failures are logged, never surfaced to the storefront.
async fn abandon_order(
    State(state): State<AppState>,
    session: BuyerSession,
    Path(order_id): Path<Uuid>,
    body: Option<Json<AbandonBody>>,
) -> StatusCode {
    let reason = body.and_then(|Json(body)| body.reason);
    if let Err(e) = state
        .lifecycle
        .track_abandonment(session.buyer_id, order_id, reason)
        .await
    {
        tracing::warn!(error = %e, order_id = %order_id, "Failed to record checkout abandonment");
    }
    StatusCode::ACCEPTED
}

async fn track_event(
    State(state): State<AppState>,
    _session: BuyerSession,
    Json(request): Json<TrackEventRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .analytics
        .record_event(request.store_id, request.event)
        .await?;
    Ok(StatusCode::ACCEPTED)
}
