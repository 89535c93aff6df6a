//! Seller dashboard handlers.
//!
//! Every route is addressed by `/stores/{store_id}` and requires the
//! `Stall-Admin-Authorization` header. The admin secret is global: it grants
//! access to every store, so the path only selects the data.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
};
use serde::Deserialize;
use stall_core::entities::products::StockAdjustmentOutcome;
use stall_sdk::objects::{
    ActivityItem, AdjustStockRequest, FunnelStats, InventorySnapshot, OrderResponse,
    SetPaymentSecretRequest, StockAdjustmentResponse, StoreOverview, TimelineStats,
    UpdateOrderStatusRequest,
};
use uuid::Uuid;

use super::error::ApiError;
use super::extractors::SellerAuth;
use super::ws;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/stores/{store_id}/orders/{order_id}/status",
            put(update_order_status),
        )
        .route(
            "/stores/{store_id}/products/{product_id}/stock",
            put(adjust_stock),
        )
        .route("/stores/{store_id}/payment-secret", put(set_payment_secret))
        .route("/stores/{store_id}/stats/timeline", get(timeline))
        .route("/stores/{store_id}/stats/inventory", get(inventory))
        .route("/stores/{store_id}/stats/funnel", get(funnel))
        .route("/stores/{store_id}/stats/overview", get(overview))
        .route("/stores/{store_id}/notifications", get(notifications))
        .route("/stores/{store_id}/ws", get(ws::store_ws))
}

#[derive(Debug, Deserialize)]
struct WindowQuery {
    days: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct FeedQuery {
    limit: Option<i64>,
}

const DEFAULT_TIMELINE_DAYS: u32 = 7;
const DEFAULT_REPORT_DAYS: u32 = 30;
const DEFAULT_FEED_LIMIT: i64 = 20;

fn adjustment_response(outcome: &StockAdjustmentOutcome) -> StockAdjustmentResponse {
    StockAdjustmentResponse {
        product_id: outcome.product.id,
        prev_stock: outcome.product.stock - outcome.adjustment,
        new_stock: outcome.product.stock,
        adjustment: outcome.adjustment,
        kind: outcome.kind,
        last_restocked_at: outcome
            .inventory
            .last_restocked_at
            .map(|at| at.unix_timestamp()),
        history_len: outcome.inventory.restock_history.len(),
    }
}

/// `PUT /stores/{store_id}/orders/{order_id}/status`
async fn update_order_status(
    State(state): State<AppState>,
    _auth: SellerAuth,
    Path((store_id, order_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let view = state
        .lifecycle
        .update_status(store_id, order_id, request.status.into())
        .await?;
    Ok(Json(OrderResponse::from(&view.order)))
}

/// `PUT /stores/{store_id}/products/{product_id}/stock`
async fn adjust_stock(
    State(state): State<AppState>,
    _auth: SellerAuth,
    Path((store_id, product_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<AdjustStockRequest>,
) -> Result<Json<StockAdjustmentResponse>, ApiError> {
    let outcome = state
        .inventory
        .adjust_stock(store_id, product_id, request.stock)
        .await?;
    Ok(Json(adjustment_response(&outcome)))
}

/// `PUT /stores/{store_id}/payment-secret`
async fn set_payment_secret(
    State(state): State<AppState>,
    _auth: SellerAuth,
    Path(store_id): Path<Uuid>,
    Json(request): Json<SetPaymentSecretRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .payments
        .set_store_secret(store_id, &request.secret)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn timeline(
    State(state): State<AppState>,
    _auth: SellerAuth,
    Path(store_id): Path<Uuid>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<TimelineStats>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_TIMELINE_DAYS);
    Ok(Json(state.analytics.timeline(store_id, days).await?))
}

async fn inventory(
    State(state): State<AppState>,
    _auth: SellerAuth,
    Path(store_id): Path<Uuid>,
) -> Result<Json<InventorySnapshot>, ApiError> {
    Ok(Json(state.analytics.inventory_snapshot(store_id).await?))
}

async fn funnel(
    State(state): State<AppState>,
    _auth: SellerAuth,
    Path(store_id): Path<Uuid>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<FunnelStats>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_REPORT_DAYS);
    Ok(Json(state.analytics.funnel(store_id, days).await?))
}

async fn overview(
    State(state): State<AppState>,
    _auth: SellerAuth,
    Path(store_id): Path<Uuid>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<StoreOverview>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_REPORT_DAYS);
    Ok(Json(state.analytics.overview(store_id, days).await?))
}

async fn notifications(
    State(state): State<AppState>,
    _auth: SellerAuth,
    Path(store_id): Path<Uuid>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<ActivityItem>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_FEED_LIMIT);
    Ok(Json(state.analytics.activity_feed(store_id, limit).await?))
}
