//! HTTP API.
//!
//! # Route groups
//!
//! - `/buyer/*`    – storefront checkout, authenticated with [`extractors::BuyerSession`]
//! - `/payments/*` – payment verification callbacks
//! - `/seller/*`   – dashboard, authenticated with [`extractors::SellerAuth`]

use axum::Router;

use crate::state::AppState;

mod buyer;
mod error;
mod extractors;
mod payments;
mod seller;
mod ws;

/// Build the `/api/v1` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/buyer", buyer::router())
        .nest("/payments", payments::router())
        .nest("/seller", seller::router())
}
