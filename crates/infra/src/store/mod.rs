//! Persistent storage for the stock ledger.
//!
//! Every engine operation runs inside one [`UnitOfWork`]: a transaction that
//! either commits all of its writes or none of them. Batches returned by
//! [`UnitOfWork::lock_batches`] stay locked until the unit of work ends, so two
//! concurrent operations never allocate from the same quantity.
//!
//! Backends:
//! - [`InMemoryStockStore`]: serializes units of work behind one async lock.
//! - [`PostgresStockStore`]: a database transaction with `SELECT ... FOR UPDATE`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use pharmacore_core::{BatchId, LocationId, ProductId, SaleId};
use pharmacore_inventory::{Batch, Location, LocationKind, NewBatch, Product};
use pharmacore_sales::{Sale, SaleItem};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;

/// Storage failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Concurrent writers collided (unique violation, serialization failure,
    /// deadlock). Retrying the whole operation may succeed.
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// A row violated a storage constraint (negative quantity, missing parent).
    #[error("storage constraint violated: {0}")]
    Constraint(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// One transaction against the stock ledger.
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] discards
/// every write it made.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn locations(&mut self) -> Result<Vec<Location>, StoreError>;

    async fn insert_location(&mut self, location: &Location) -> Result<(), StoreError>;

    async fn product_by_sku(&mut self, sku: &str) -> Result<Option<Product>, StoreError>;

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// All products, ordered by sku.
    async fn products(&mut self) -> Result<Vec<Product>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the sku is taken.
    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError>;

    /// Positive batches of `product_id` at `location_id`, locked for the rest of
    /// this unit of work, ordered by expiry then sequence.
    async fn lock_batches(
        &mut self,
        product_id: ProductId,
        location_id: LocationId,
    ) -> Result<Vec<Batch>, StoreError>;

    /// Every batch at `location_id`, depleted ones included, ordered by sequence.
    async fn batches_at(&mut self, location_id: LocationId) -> Result<Vec<Batch>, StoreError>;

    async fn batch(&mut self, id: BatchId) -> Result<Option<Batch>, StoreError>;

    /// Persist a new batch; the store assigns its sequence.
    async fn insert_batch(&mut self, batch: NewBatch) -> Result<Batch, StoreError>;

    /// Fails with [`StoreError::Constraint`] for a negative quantity or an
    /// unknown batch.
    async fn set_batch_quantity(&mut self, id: BatchId, quantity: i64) -> Result<(), StoreError>;

    /// Sale header only; items are written with [`UnitOfWork::insert_sale_item`].
    async fn insert_sale(&mut self, sale: &Sale) -> Result<(), StoreError>;

    async fn insert_sale_item(&mut self, item: &SaleItem) -> Result<(), StoreError>;

    async fn set_sale_total(&mut self, id: SaleId, total: Decimal) -> Result<(), StoreError>;

    /// Most recent sales first, items in line order.
    async fn recent_sales(&mut self, limit: usize) -> Result<Vec<Sale>, StoreError>;

    /// Sales created at or after `since`, with items.
    async fn sales_since(&mut self, since: DateTime<Utc>) -> Result<Vec<Sale>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Source of units of work.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

#[async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        (**self).begin().await
    }
}

/// Insert whichever of the two canonical locations is missing.
///
/// Idempotent: running it against a seeded ledger changes nothing.
pub async fn seed_locations<S>(store: &S) -> Result<Vec<Location>, StoreError>
where
    S: StockStore + ?Sized,
{
    let mut uow = store.begin().await?;
    let mut existing = uow.locations().await?;

    for kind in LocationKind::ALL {
        if existing.iter().all(|l| l.kind != kind) {
            let location = Location::new(kind);
            uow.insert_location(&location).await?;
            tracing::info!(kind = %kind, location_id = %location.id, "seeded location");
            existing.push(location);
        }
    }

    uow.commit().await?;
    Ok(existing)
}
