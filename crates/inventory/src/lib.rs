//! Inventory domain module: the batch ledger and the allocation engine.
//!
//! This crate contains business rules for stock lots, implemented purely as
//! deterministic domain logic (no IO, no storage). Reading and locking batches
//! is the store's job; deciding which batch satisfies a request is done here.

pub mod allocation;
pub mod batch;
pub mod events;
pub mod location;
pub mod product;
pub mod stock;
pub mod transfer;

pub use allocation::{AllocationPlan, Deduction, allocate, ensure_not_expired, validate_request};
pub use batch::{Batch, NewBatch, ReceiveBatch, available_quantity};
pub use events::{BatchReceived, InventoryEvent, StockTransferred, TransferMove};
pub use location::{Location, LocationKind, Locations};
pub use product::{NewProduct, Product};
pub use stock::StockLevel;
pub use transfer::TransferReceipt;
