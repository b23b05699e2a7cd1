use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pharmacore_core::{BatchId, ProductId};
use pharmacore_events::Event;

/// Event: BatchReceived (warehouse receipt committed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceived {
    pub batch_id: BatchId,
    pub product_id: ProductId,
    pub batch_number: String,
    pub quantity: i64,
    pub expiry_date: NaiveDate,
    pub cost_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// One source→destination move inside a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMove {
    pub source_batch_id: BatchId,
    pub destination_batch_id: BatchId,
    pub quantity: i64,
}

/// Event: StockTransferred (warehouse → store committed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransferred {
    pub product_id: ProductId,
    pub sku: String,
    pub quantity: i64,
    pub moves: Vec<TransferMove>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    BatchReceived(BatchReceived),
    StockTransferred(StockTransferred),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::BatchReceived(_) => "inventory.batch.received",
            InventoryEvent::StockTransferred(_) => "inventory.stock.transferred",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::BatchReceived(e) => e.occurred_at,
            InventoryEvent::StockTransferred(e) => e.occurred_at,
        }
    }
}
