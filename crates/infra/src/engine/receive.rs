use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use pharmacore_events::EventBus;
use pharmacore_inventory::{Batch, BatchReceived, InventoryEvent, NewBatch, ReceiveBatch};

use super::{EngineError, LedgerEnvelope, StockEngine, finish};
use crate::store::{StockStore, UnitOfWork};

impl<S, B> StockEngine<S, B>
where
    S: StockStore,
    B: EventBus<LedgerEnvelope>,
{
    /// Record a delivery at the warehouse.
    #[instrument(skip(self, command), fields(product_id = %command.product_id, batch_number = %command.batch_number), err)]
    pub async fn receive(&self, command: ReceiveBatch) -> Result<Batch, EngineError> {
        command.validate()?;
        let now = self.clock.now();

        let mut uow = self.store.begin().await?;
        let outcome = self.receive_within(uow.as_mut(), &command, now).await;
        let batch = finish(uow, outcome).await?;

        info!(batch_id = %batch.id, quantity = batch.quantity, "batch received");

        self.publish(
            *batch.id.as_uuid(),
            "batch",
            &InventoryEvent::BatchReceived(BatchReceived {
                batch_id: batch.id,
                product_id: batch.product_id,
                batch_number: batch.batch_number.clone(),
                quantity: batch.quantity,
                expiry_date: batch.expiry_date,
                cost_price: batch.cost_price,
                occurred_at: now,
            }),
        );
        Ok(batch)
    }

    async fn receive_within(
        &self,
        uow: &mut dyn UnitOfWork,
        command: &ReceiveBatch,
        now: DateTime<Utc>,
    ) -> Result<Batch, EngineError> {
        if uow.product(command.product_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("product {}", command.product_id)));
        }
        let batch = NewBatch::receipt(command, self.locations.warehouse(), now)?;
        Ok(uow.insert_batch(batch).await?)
    }
}
