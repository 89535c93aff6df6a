//! Inventory consistency rules and the manual stock adjustment service.
//!
//! Stock decrements for paid orders run inside the order transition (see
//! [`crate::lifecycle`]); the arithmetic lives here so both persistence
//! backends apply the same rules.

use std::collections::BTreeMap;

use stall_sdk::objects::AdjustmentKind;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::event_log::{DomainEvent, StockAdjusted, StockReducedByOrder};
use crate::entities::order_records::OrderItemRecord;
use crate::entities::products::{AdjustProductStock, RestockEntry, StockAdjustmentOutcome};
use crate::entities::stores::GetStoreById;
use crate::error::CommerceError;
use crate::events::StoreBroadcaster;
use crate::framework::CommerceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDecrement {
    pub prev: i32,
    pub new: i32,
    /// The decrement took stock below zero.
    pub oversold: bool,
}

/// Subtract `quantity` from `stock`. Stock is never clamped.
pub fn decrement(stock: i32, quantity: i32) -> StockDecrement {
    let new = stock.saturating_sub(quantity);
    StockDecrement {
        prev: stock,
        new,
        oversold: new < 0,
    }
}

/// Signed change and its classification: positive changes are restocks,
/// everything else (including zero) is a manual adjustment.
pub fn classify_adjustment(old_stock: i32, new_stock: i32) -> (i32, AdjustmentKind) {
    let adjustment = new_stock.saturating_sub(old_stock);
    let kind = if adjustment > 0 {
        AdjustmentKind::Restock
    } else {
        AdjustmentKind::ManualAdjustment
    };
    (adjustment, kind)
}

/// Everything written by one manual stock change.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentPlan {
    pub adjustment: i32,
    pub kind: AdjustmentKind,
    pub entry: RestockEntry,
    pub event: DomainEvent,
}

pub fn plan_adjustment(
    product_id: Uuid,
    old_stock: i32,
    new_stock: i32,
    at: time::OffsetDateTime,
) -> AdjustmentPlan {
    let (adjustment, kind) = classify_adjustment(old_stock, new_stock);
    let payload = StockAdjusted {
        product_id,
        prev_quantity: old_stock,
        new_quantity: new_stock,
        added: adjustment,
    };
    let event = match kind {
        AdjustmentKind::Restock => DomainEvent::ProductRestocked(payload),
        AdjustmentKind::ManualAdjustment => DomainEvent::StockAdjustedManually(payload),
    };
    AdjustmentPlan {
        adjustment,
        kind,
        entry: RestockEntry {
            date: at,
            prev_quantity: old_stock,
            new_quantity: new_stock,
            added: adjustment,
            kind,
        },
        event,
    }
}

/// Apply the stock decrements of a paid order to `stock` (current level
/// per product id) and return one reduction per item.
///
/// Items are processed in product id order. Items whose product no longer
/// exists are skipped.
pub fn reduce_for_order(
    order_id: Uuid,
    items: &[OrderItemRecord],
    stock: &mut BTreeMap<Uuid, i32>,
) -> Vec<StockReducedByOrder> {
    let mut ordered: Vec<&OrderItemRecord> = items.iter().collect();
    ordered.sort_by_key(|item| (item.product_id, item.id));

    let mut reductions = Vec::with_capacity(ordered.len());
    for item in ordered {
        let Some(level) = stock.get_mut(&item.product_id) else {
            warn!(
                order_id = %order_id,
                product_id = %item.product_id,
                "Paid order references a product that no longer exists, skipping stock decrement"
            );
            continue;
        };
        let change = decrement(*level, item.quantity);
        if change.oversold {
            warn!(
                order_id = %order_id,
                product_id = %item.product_id,
                prev_stock = change.prev,
                new_stock = change.new,
                "Stock went negative while fulfilling paid order"
            );
        }
        *level = change.new;
        reductions.push(StockReducedByOrder {
            order_id,
            product_id: item.product_id,
            quantity: item.quantity,
            prev_stock: change.prev,
            new_stock: change.new,
            oversold: change.oversold,
        });
    }
    reductions
}

/// Seller-facing stock adjustments.
#[derive(Clone)]
pub struct InventoryEngine<S> {
    store: S,
    broadcaster: StoreBroadcaster,
}

impl<S: CommerceStore> InventoryEngine<S> {
    pub fn new(store: S, broadcaster: StoreBroadcaster) -> Self {
        Self { store, broadcaster }
    }

    /// Set a product's stock to `new_stock`.
    pub async fn adjust_stock(
        &self,
        store_id: Uuid,
        product_id: Uuid,
        new_stock: i32,
    ) -> Result<StockAdjustmentOutcome, CommerceError> {
        if new_stock < 0 {
            return Err(CommerceError::validation("stock cannot be negative"));
        }
        let store = self
            .store
            .process(GetStoreById { store_id })
            .await?
            .ok_or_else(|| CommerceError::not_found("store", store_id))?;

        let outcome = self
            .store
            .process(AdjustProductStock {
                tenant_id: store.tenant_id,
                store_id,
                product_id,
                new_stock,
            })
            .await?
            .ok_or_else(|| CommerceError::not_found("product", product_id))?;

        info!(
            store_id = %store_id,
            product_id = %product_id,
            prev_stock = outcome.product.stock - outcome.adjustment,
            new_stock = outcome.product.stock,
            kind = ?outcome.kind,
            "Stock adjusted"
        );

        self.broadcaster
            .publish_events(std::slice::from_ref(&outcome.event));
        self.broadcaster.stats_updated(store_id);
        Ok(outcome)
    }
}
