use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pharmacore_core::{ProductId, SaleId, UserId};
use pharmacore_events::Event;
use pharmacore_inventory::Deduction;

/// Event: SaleCompleted (sale committed; feeds the sales ledger).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleCompleted {
    pub sale_id: SaleId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub sku: String,
    pub quantity: i64,
    pub total_amount: Decimal,
    pub deductions: Vec<Deduction>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    SaleCompleted(SaleCompleted),
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleCompleted(_) => "sales.sale.completed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::SaleCompleted(e) => e.occurred_at,
        }
    }
}
