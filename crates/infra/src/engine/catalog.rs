use std::collections::HashMap;

use tracing::{info, instrument};

use pharmacore_core::ProductId;
use pharmacore_events::EventBus;
use pharmacore_inventory::{Batch, LocationKind, NewProduct, Product, StockLevel};

use super::{EngineError, LedgerEnvelope, StockEngine, discard, finish};
use crate::store::{StockStore, StoreError, UnitOfWork};

impl<S, B> StockEngine<S, B>
where
    S: StockStore,
    B: EventBus<LedgerEnvelope>,
{
    #[instrument(skip(self, new), fields(sku = %new.sku), err)]
    pub async fn create_product(&self, new: NewProduct) -> Result<Product, EngineError> {
        let product = new.into_product(ProductId::new())?;

        let mut uow = self.store.begin().await?;
        let outcome = insert_product(uow.as_mut(), &product).await;
        finish(uow, outcome).await?;

        info!(product_id = %product.id, "product created");
        Ok(product)
    }

    /// Stock per product and location, ordered by sku then location.
    #[instrument(skip(self), err)]
    pub async fn stock_overview(&self) -> Result<Vec<StockLevel>, EngineError> {
        let today = self.clock.today();
        let mut uow = self.store.begin().await?;
        let outcome = self.overview_within(uow.as_mut(), today).await;
        discard(uow, outcome).await
    }

    async fn overview_within(
        &self,
        uow: &mut dyn UnitOfWork,
        today: chrono::NaiveDate,
    ) -> Result<Vec<StockLevel>, EngineError> {
        let products = uow.products().await?;

        let mut by_location: Vec<(LocationKind, HashMap<ProductId, Vec<Batch>>)> = Vec::new();
        for kind in LocationKind::ALL {
            let mut grouped: HashMap<ProductId, Vec<Batch>> = HashMap::new();
            for batch in uow.batches_at(self.locations.id_of(kind)).await? {
                grouped.entry(batch.product_id).or_default().push(batch);
            }
            by_location.push((kind, grouped));
        }

        let mut levels = Vec::with_capacity(products.len() * by_location.len());
        for product in &products {
            for (kind, grouped) in &by_location {
                let batches = grouped.get(&product.id).map(Vec::as_slice).unwrap_or_default();
                levels.push(StockLevel::summarize(product, *kind, batches, today));
            }
        }
        Ok(levels)
    }
}

async fn insert_product(uow: &mut dyn UnitOfWork, product: &Product) -> Result<(), EngineError> {
    if uow.product_by_sku(&product.sku).await?.is_some() {
        return Err(EngineError::Conflict(format!("sku {} already exists", product.sku)));
    }
    match uow.insert_product(product).await {
        Ok(()) => Ok(()),
        // Lost a race with a concurrent insert of the same sku.
        Err(StoreError::Conflict(msg)) => Err(EngineError::Conflict(msg)),
        Err(err) => Err(err.into()),
    }
}
