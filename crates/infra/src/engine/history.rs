use std::collections::HashMap;

use chrono::{DateTime, Days, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use pharmacore_core::{BatchId, ProductId, SaleId, UserId};
use pharmacore_events::EventBus;
use pharmacore_inventory::{Batch, Product};
use pharmacore_sales::{DailySales, Sale, daily_totals};

use super::{EngineError, LedgerEnvelope, StockEngine, discard};
use crate::store::{StockStore, UnitOfWork};

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Longest window `daily_sales` accepts.
const MAX_STATS_DAYS: u32 = 366;

/// A sale item resolved to something a person can read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleLine {
    pub line_no: u32,
    pub batch_id: BatchId,
    pub batch_number: String,
    pub product_id: ProductId,
    pub sku: String,
    pub product_name: String,
    pub quantity: i64,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleHistoryEntry {
    pub sale_id: SaleId,
    pub user_id: UserId,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<SaleLine>,
}

impl<S, B> StockEngine<S, B>
where
    S: StockStore,
    B: EventBus<LedgerEnvelope>,
{
    /// The `limit` most recent sales, newest first.
    #[instrument(skip(self), err)]
    pub async fn sales_history(&self, limit: usize) -> Result<Vec<SaleHistoryEntry>, EngineError> {
        if limit == 0 {
            return Err(EngineError::Validation("limit must be positive".to_string()));
        }
        let mut uow = self.store.begin().await?;
        let outcome = history_within(uow.as_mut(), limit).await;
        discard(uow, outcome).await
    }

    /// Units sold and revenue per day for the last `days` days, today included,
    /// oldest first.
    #[instrument(skip(self), err)]
    pub async fn daily_sales(&self, days: u32) -> Result<Vec<DailySales>, EngineError> {
        if days == 0 || days > MAX_STATS_DAYS {
            return Err(EngineError::Validation(format!(
                "days must be between 1 and {MAX_STATS_DAYS}"
            )));
        }
        let today = self.clock.today();
        let first_day = today
            .checked_sub_days(Days::new(u64::from(days - 1)))
            .ok_or_else(|| EngineError::Validation("window starts before the calendar does".to_string()))?;
        let since = first_day.and_time(NaiveTime::MIN).and_utc();

        let mut uow = self.store.begin().await?;
        let outcome = uow.sales_since(since).await.map_err(EngineError::from);
        let sales = discard(uow, outcome).await?;
        Ok(daily_totals(&sales, today, days)?)
    }
}

async fn history_within(uow: &mut dyn UnitOfWork, limit: usize) -> Result<Vec<SaleHistoryEntry>, EngineError> {
    let sales = uow.recent_sales(limit).await?;

    let mut batches: HashMap<BatchId, Batch> = HashMap::new();
    let mut products: HashMap<ProductId, Product> = HashMap::new();
    let mut entries = Vec::with_capacity(sales.len());

    for sale in sales {
        let mut lines = Vec::with_capacity(sale.items.len());
        for item in &sale.items {
            let batch = match batches.get(&item.batch_id) {
                Some(batch) => batch.clone(),
                None => {
                    let batch = uow
                        .batch(item.batch_id)
                        .await?
                        .ok_or_else(|| EngineError::NotFound(format!("batch {}", item.batch_id)))?;
                    batches.insert(batch.id, batch.clone());
                    batch
                }
            };
            let product = match products.get(&batch.product_id) {
                Some(product) => product.clone(),
                None => {
                    let product = uow
                        .product(batch.product_id)
                        .await?
                        .ok_or_else(|| EngineError::NotFound(format!("product {}", batch.product_id)))?;
                    products.insert(product.id, product.clone());
                    product
                }
            };

            lines.push(SaleLine {
                line_no: item.line_no,
                batch_id: batch.id,
                batch_number: batch.batch_number,
                product_id: product.id,
                sku: product.sku,
                product_name: product.name,
                quantity: item.quantity,
                price: item.price,
            });
        }
        entries.push(entry(&sale, lines));
    }
    Ok(entries)
}

fn entry(sale: &Sale, lines: Vec<SaleLine>) -> SaleHistoryEntry {
    SaleHistoryEntry {
        sale_id: sale.id,
        user_id: sale.user_id,
        total_amount: sale.total_amount,
        created_at: sale.created_at,
        lines,
    }
}
