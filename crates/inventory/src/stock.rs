use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pharmacore_core::ProductId;

use crate::batch::{Batch, available_quantity, saturating_total};
use crate::location::LocationKind;
use crate::product::Product;

/// Stock position of one product at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub location: LocationKind,
    /// Non-expired, positive-quantity stock, clamped at `i64::MAX`.
    pub available: i64,
    /// Units still on hand past their expiry (awaiting disposal), clamped at `i64::MAX`.
    pub expired: i64,
    /// Batches with stock on hand, expired or not.
    pub batch_count: usize,
    pub min_stock: i64,
    /// Store stock below the product's advisory minimum.
    pub low_stock: bool,
}

impl StockLevel {
    /// Summarize `batches` (already scoped to `product` at `location`).
    pub fn summarize(product: &Product, location: LocationKind, batches: &[Batch], today: NaiveDate) -> Self {
        let available = available_quantity(batches, today);
        let expired = saturating_total(batches.iter().filter(|b| b.quantity > 0 && b.is_expired(today)));

        Self {
            product_id: product.id,
            sku: product.sku.clone(),
            name: product.name.clone(),
            location,
            available,
            expired,
            batch_count: batches.iter().filter(|b| b.quantity > 0).count(),
            min_stock: product.min_stock,
            low_stock: location == LocationKind::Store && available < product.min_stock,
        }
    }
}
