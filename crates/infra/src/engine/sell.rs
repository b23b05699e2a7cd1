use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument};

use pharmacore_core::{SaleId, UserId};
use pharmacore_events::EventBus;
use pharmacore_inventory::{Deduction, Product, allocate, ensure_not_expired, validate_request};
use pharmacore_sales::{Sale, SaleCompleted, SaleEvent, SaleReceipt};

use super::{EngineError, LedgerEnvelope, StockEngine, finish, planned_batch, require_product};
use crate::store::{StockStore, UnitOfWork};

struct Completed {
    product: Product,
    sale: Sale,
    deductions: Vec<Deduction>,
}

impl<S, B> StockEngine<S, B>
where
    S: StockStore,
    B: EventBus<LedgerEnvelope>,
{
    /// Sell `quantity` units of `sku` from the store, soonest expiry first.
    ///
    /// All or nothing: on any error no batch is decremented and no sale exists.
    #[instrument(skip(self), err)]
    pub async fn sell(&self, sku: &str, quantity: i64, user_id: UserId) -> Result<SaleReceipt, EngineError> {
        validate_request(quantity)?;
        let sku = sku.trim();
        let now = self.clock.now();
        let today = self.clock.today();

        let mut uow = self.store.begin().await?;
        let outcome = self.sell_within(uow.as_mut(), sku, quantity, user_id, now, today).await;
        let Completed {
            product,
            sale,
            deductions,
        } = finish(uow, outcome).await?;

        info!(
            sale_id = %sale.id,
            sku = %product.sku,
            quantity,
            total = %sale.total_amount,
            batches = deductions.len(),
            "sale committed"
        );

        let receipt = SaleReceipt::success(&sale, deductions.clone());
        self.publish(
            *sale.id.as_uuid(),
            "sale",
            &SaleEvent::SaleCompleted(SaleCompleted {
                sale_id: sale.id,
                user_id: sale.user_id,
                product_id: product.id,
                sku: product.sku,
                quantity,
                total_amount: sale.total_amount,
                deductions,
                occurred_at: now,
            }),
        );
        Ok(receipt)
    }

    async fn sell_within(
        &self,
        uow: &mut dyn UnitOfWork,
        sku: &str,
        quantity: i64,
        user_id: UserId,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<Completed, EngineError> {
        let product = require_product(uow, sku).await?;

        let candidates = uow.lock_batches(product.id, self.locations.store()).await?;
        if candidates.is_empty() {
            return Err(EngineError::NotFound(format!("stock for {sku} at STORE")));
        }

        // Fail closed over every candidate, not only the ones the plan would touch.
        ensure_not_expired(&candidates, today)?;

        let plan = allocate(&candidates, quantity)?.into_result()?;
        debug!(deductions = plan.deductions.len(), "sale planned");

        let mut sale = Sale::open(SaleId::new(), user_id, now);
        uow.insert_sale(&sale).await?;

        for deduction in &plan.deductions {
            let mut batch = planned_batch(&candidates, deduction)?.clone();
            batch.deduct(deduction.quantity_taken)?;
            uow.set_batch_quantity(batch.id, batch.quantity).await?;

            let price = self.pricing.unit_price(batch.cost_price)?;
            let item = sale.add_item(batch.id, deduction.quantity_taken, price)?;
            uow.insert_sale_item(item).await?;
        }

        uow.set_sale_total(sale.id, sale.total_amount).await?;

        Ok(Completed {
            product,
            sale,
            deductions: plan.deductions,
        })
    }
}
