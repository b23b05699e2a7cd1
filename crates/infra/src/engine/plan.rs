use tracing::instrument;

use pharmacore_events::EventBus;
use pharmacore_inventory::{AllocationPlan, LocationKind, allocate, validate_request};

use super::{EngineError, LedgerEnvelope, StockEngine, discard, require_product};
use crate::store::{StockStore, UnitOfWork};

impl<S, B> StockEngine<S, B>
where
    S: StockStore,
    B: EventBus<LedgerEnvelope>,
{
    /// Preview which batches would serve `quantity` units of `sku` at
    /// `location`, without changing anything.
    ///
    /// Only stock that could actually move is planned over: expired batches
    /// are skipped, and a shortfall is reported in the plan instead of failing.
    #[instrument(skip(self), err)]
    pub async fn plan(&self, sku: &str, location: LocationKind, quantity: i64) -> Result<AllocationPlan, EngineError> {
        validate_request(quantity)?;
        let sku = sku.trim();
        let today = self.clock.today();

        let mut uow = self.store.begin().await?;
        let outcome = self.plan_within(uow.as_mut(), sku, location, quantity, today).await;
        discard(uow, outcome).await
    }

    async fn plan_within(
        &self,
        uow: &mut dyn UnitOfWork,
        sku: &str,
        location: LocationKind,
        quantity: i64,
        today: chrono::NaiveDate,
    ) -> Result<AllocationPlan, EngineError> {
        let product = require_product(uow, sku).await?;
        let candidates = uow.lock_batches(product.id, self.locations.id_of(location)).await?;
        Ok(allocate(candidates.iter().filter(|b| !b.is_expired(today)), quantity)?)
    }
}
