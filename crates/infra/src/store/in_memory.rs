use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use pharmacore_core::{BatchId, LocationId, ProductId, SaleId};
use pharmacore_inventory::{Batch, Location, NewBatch, Product};
use pharmacore_sales::{Sale, SaleItem};

use super::{StockStore, StoreError, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct Ledger {
    locations: Vec<Location>,
    products: HashMap<ProductId, Product>,
    batches: HashMap<BatchId, Batch>,
    last_sequence: u64,
    /// Insertion order.
    sales: Vec<Sale>,
}

impl Ledger {
    fn sale_mut(&mut self, id: SaleId) -> Result<&mut Sale, StoreError> {
        self.sales
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::Constraint(format!("sale {id} does not exist")))
    }
}

/// In-memory stock ledger.
///
/// Intended for tests/dev. Units of work are fully serialized: `begin` waits
/// for the previous unit of work to end, then works on a private copy that
/// replaces the ledger on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockStore {
    ledger: Arc<Mutex<Ledger>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with a conflict, as a concurrent writer would.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Committed batches in sequence order.
    pub async fn batches(&self) -> Vec<Batch> {
        let ledger = self.ledger.lock().await;
        let mut batches: Vec<Batch> = ledger.batches.values().cloned().collect();
        batches.sort_by_key(|b| b.sequence);
        batches
    }

    /// Committed sales in insertion order.
    pub async fn sales(&self) -> Vec<Sale> {
        self.ledger.lock().await.sales.clone()
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = Arc::clone(&self.ledger).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork {
            guard,
            working,
            fail_commit: Arc::clone(&self.fail_next_commit),
        }))
    }
}

struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<Ledger>,
    working: Ledger,
    fail_commit: Arc<AtomicBool>,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn locations(&mut self) -> Result<Vec<Location>, StoreError> {
        Ok(self.working.locations.clone())
    }

    async fn insert_location(&mut self, location: &Location) -> Result<(), StoreError> {
        if self.working.locations.iter().any(|l| l.kind == location.kind || l.id == location.id) {
            return Err(StoreError::Conflict(format!("location {} already exists", location.kind)));
        }
        self.working.locations.push(*location);
        Ok(())
    }

    async fn product_by_sku(&mut self, sku: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.working.products.values().find(|p| p.sku == sku).cloned())
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn products(&mut self) -> Result<Vec<Product>, StoreError> {
        let mut products: Vec<Product> = self.working.products.values().cloned().collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(products)
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        if self.working.products.values().any(|p| p.sku == product.sku) {
            return Err(StoreError::Conflict(format!("sku {} already exists", product.sku)));
        }
        if self.working.products.contains_key(&product.id) {
            return Err(StoreError::Conflict(format!("product {} already exists", product.id)));
        }
        self.working.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn lock_batches(
        &mut self,
        product_id: ProductId,
        location_id: LocationId,
    ) -> Result<Vec<Batch>, StoreError> {
        let mut batches: Vec<Batch> = self
            .working
            .batches
            .values()
            .filter(|b| b.product_id == product_id && b.location_id == location_id && b.quantity > 0)
            .cloned()
            .collect();
        batches.sort_by(|a, b| a.expiry_date.cmp(&b.expiry_date).then(a.sequence.cmp(&b.sequence)));
        Ok(batches)
    }

    async fn batches_at(&mut self, location_id: LocationId) -> Result<Vec<Batch>, StoreError> {
        let mut batches: Vec<Batch> = self
            .working
            .batches
            .values()
            .filter(|b| b.location_id == location_id)
            .cloned()
            .collect();
        batches.sort_by_key(|b| b.sequence);
        Ok(batches)
    }

    async fn batch(&mut self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        Ok(self.working.batches.get(&id).cloned())
    }

    async fn insert_batch(&mut self, batch: NewBatch) -> Result<Batch, StoreError> {
        if batch.quantity < 0 {
            return Err(StoreError::Constraint("batch quantity cannot be negative".to_string()));
        }
        if !self.working.products.contains_key(&batch.product_id) {
            return Err(StoreError::Constraint(format!("product {} does not exist", batch.product_id)));
        }
        if !self.working.locations.iter().any(|l| l.id == batch.location_id) {
            return Err(StoreError::Constraint(format!("location {} does not exist", batch.location_id)));
        }
        if self.working.batches.contains_key(&batch.id) {
            return Err(StoreError::Conflict(format!("batch {} already exists", batch.id)));
        }

        self.working.last_sequence += 1;
        let batch = batch.into_batch(self.working.last_sequence);
        self.working.batches.insert(batch.id, batch.clone());
        Ok(batch)
    }

    async fn set_batch_quantity(&mut self, id: BatchId, quantity: i64) -> Result<(), StoreError> {
        if quantity < 0 {
            return Err(StoreError::Constraint("batch quantity cannot be negative".to_string()));
        }
        let batch = self
            .working
            .batches
            .get_mut(&id)
            .ok_or_else(|| StoreError::Constraint(format!("batch {id} does not exist")))?;
        batch.quantity = quantity;
        Ok(())
    }

    async fn insert_sale(&mut self, sale: &Sale) -> Result<(), StoreError> {
        if self.working.sales.iter().any(|s| s.id == sale.id) {
            return Err(StoreError::Conflict(format!("sale {} already exists", sale.id)));
        }
        let mut header = sale.clone();
        header.items.clear();
        self.working.sales.push(header);
        Ok(())
    }

    async fn insert_sale_item(&mut self, item: &SaleItem) -> Result<(), StoreError> {
        if !self.working.batches.contains_key(&item.batch_id) {
            return Err(StoreError::Constraint(format!("batch {} does not exist", item.batch_id)));
        }
        let sale = self.working.sale_mut(item.sale_id)?;
        if sale.items.iter().any(|i| i.line_no == item.line_no) {
            return Err(StoreError::Conflict(format!(
                "sale {} already has line {}",
                item.sale_id, item.line_no
            )));
        }
        sale.items.push(item.clone());
        sale.items.sort_by_key(|i| i.line_no);
        Ok(())
    }

    async fn set_sale_total(&mut self, id: SaleId, total: Decimal) -> Result<(), StoreError> {
        self.working.sale_mut(id)?.total_amount = total;
        Ok(())
    }

    async fn recent_sales(&mut self, limit: usize) -> Result<Vec<Sale>, StoreError> {
        let mut sales = self.working.sales.clone();
        // Ties: later inserts first.
        sales.sort_by_key(|s| s.created_at);
        sales.reverse();
        sales.truncate(limit);
        Ok(sales)
    }

    async fn sales_since(&mut self, since: DateTime<Utc>) -> Result<Vec<Sale>, StoreError> {
        Ok(self
            .working
            .sales
            .iter()
            .filter(|s| s.created_at >= since)
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryUnitOfWork {
            mut guard,
            working,
            fail_commit,
        } = *self;
        if fail_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Conflict("commit rejected".to_string()));
        }
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
