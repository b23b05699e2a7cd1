//! Sales ledger domain module.
//!
//! Sales are append-only: once committed a sale and its items never change.
//! Pricing is a pluggable policy kept apart from batch allocation.

pub mod events;
pub mod pricing;
pub mod sale;
pub mod stats;

pub use events::{SaleCompleted, SaleEvent};
pub use pricing::{MarkupPricing, PricingPolicy};
pub use sale::{Sale, SaleItem, SaleReceipt, SaleStatus};
pub use stats::{DailySales, daily_totals};
