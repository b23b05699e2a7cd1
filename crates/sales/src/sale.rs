use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pharmacore_core::{BatchId, DomainError, DomainResult, Entity, SaleId, UserId};
use pharmacore_inventory::Deduction;

/// One line of a sale: units drawn from a single batch at a unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItem {
    pub sale_id: SaleId,
    /// 1-based position; items are stored in allocation order.
    pub line_no: u32,
    pub batch_id: BatchId,
    pub quantity: i64,
    /// Unit price charged.
    pub price: Decimal,
}

impl SaleItem {
    pub fn line_total(&self) -> DomainResult<Decimal> {
        self.price
            .checked_mul(Decimal::from(self.quantity))
            .ok_or_else(|| DomainError::validation(format!("line {} total overflows", self.line_no)))
    }
}

/// A completed sale and its ordered items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: SaleId,
    pub user_id: UserId,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub items: Vec<SaleItem>,
}

impl Entity for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Sale {
    /// Header with a zero total; the total is finalized as items are added.
    pub fn open(id: SaleId, user_id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            total_amount: Decimal::ZERO,
            created_at,
            items: Vec::new(),
        }
    }

    /// Append an item and fold its line total into `total_amount`.
    ///
    /// Leaves the sale untouched if the line or the new total overflows.
    pub fn add_item(&mut self, batch_id: BatchId, quantity: i64, price: Decimal) -> DomainResult<&SaleItem> {
        let line_no = self.items.len() as u32 + 1;
        let item = SaleItem {
            sale_id: self.id,
            line_no,
            batch_id,
            quantity,
            price,
        };
        self.total_amount = self
            .total_amount
            .checked_add(item.line_total()?)
            .ok_or_else(|| DomainError::validation("sale total overflows"))?;
        self.items.push(item);
        Ok(&self.items[self.items.len() - 1])
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Success,
}

/// What the caller gets back from a sale: enough to render a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleReceipt {
    pub status: SaleStatus,
    pub message: String,
    pub sale_id: SaleId,
    pub total_amount: Decimal,
    pub details: Vec<Deduction>,
}

impl SaleReceipt {
    pub fn success(sale: &Sale, details: Vec<Deduction>) -> Self {
        Self {
            status: SaleStatus::Success,
            message: format!("Sold {} units using FIFO.", sale.total_quantity()),
            sale_id: sale.id,
            total_amount: sale.total_amount,
            details,
        }
    }
}
