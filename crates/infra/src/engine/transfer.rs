use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument};

use pharmacore_events::EventBus;
use pharmacore_inventory::{
    InventoryEvent, NewBatch, StockTransferred, TransferReceipt, allocate, validate_request,
};

use super::{EngineError, LedgerEnvelope, StockEngine, finish, planned_batch, require_product};
use crate::store::{StockStore, UnitOfWork};

impl<S, B> StockEngine<S, B>
where
    S: StockStore,
    B: EventBus<LedgerEnvelope>,
{
    /// Move `quantity` units of `sku` from the warehouse to the store.
    ///
    /// Expired warehouse batches are left behind. Each depleted source batch
    /// becomes a new store batch with the same batch number, expiry and cost.
    #[instrument(skip(self), err)]
    pub async fn transfer(&self, sku: &str, quantity: i64) -> Result<TransferReceipt, EngineError> {
        validate_request(quantity)?;
        let sku = sku.trim();
        let now = self.clock.now();
        let today = self.clock.today();

        let mut uow = self.store.begin().await?;
        let outcome = self.transfer_within(uow.as_mut(), sku, quantity, now, today).await;
        let receipt = finish(uow, outcome).await?;

        info!(
            sku = %receipt.sku,
            quantity = receipt.quantity,
            batches = receipt.created.len(),
            "transfer committed"
        );

        self.publish(
            *receipt.product_id.as_uuid(),
            "product",
            &InventoryEvent::StockTransferred(StockTransferred {
                product_id: receipt.product_id,
                sku: receipt.sku.clone(),
                quantity: receipt.quantity,
                moves: receipt.moves(),
                occurred_at: now,
            }),
        );
        Ok(receipt)
    }

    async fn transfer_within(
        &self,
        uow: &mut dyn UnitOfWork,
        sku: &str,
        quantity: i64,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<TransferReceipt, EngineError> {
        let product = require_product(uow, sku).await?;

        let candidates = uow.lock_batches(product.id, self.locations.warehouse()).await?;
        let plan = allocate(candidates.iter().filter(|b| !b.is_expired(today)), quantity)?.into_result()?;
        debug!(deductions = plan.deductions.len(), "transfer planned");

        let mut created = Vec::with_capacity(plan.deductions.len());
        for deduction in &plan.deductions {
            let mut source = planned_batch(&candidates, deduction)?.clone();
            source.deduct(deduction.quantity_taken)?;
            uow.set_batch_quantity(source.id, source.quantity).await?;

            let credit = NewBatch::transferred_from(&source, deduction.quantity_taken, self.locations.store(), now);
            created.push(uow.insert_batch(credit).await?);
        }

        Ok(TransferReceipt::new(product.id, &product.sku, plan.deductions, created))
    }
}
