use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pharmacore_core::{BatchId, DomainError, DomainResult, Entity, LocationId, ProductId};

/// A physical stock lot of one product at one location.
///
/// Quantity never goes negative. A batch drained to zero is kept as history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub batch_number: String,
    pub quantity: i64,
    pub expiry_date: NaiveDate,
    pub cost_price: Decimal,
    /// Store-assigned insertion order; breaks expiry ties during allocation.
    pub sequence: u64,
    pub received_at: DateTime<Utc>,
    /// Warehouse batch this one was transferred from, if any.
    pub source_batch_id: Option<BatchId>,
}

impl Entity for Batch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Batch {
    /// Expired once the expiry date is strictly before `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date < today
    }

    /// Counts towards available stock: positive quantity and not expired.
    pub fn is_available(&self, today: NaiveDate) -> bool {
        self.quantity > 0 && !self.is_expired(today)
    }

    /// Remove `quantity` units. Fails without mutating if it would go negative.
    pub fn deduct(&mut self, quantity: i64) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("deduction must be positive"));
        }
        if quantity > self.quantity {
            return Err(DomainError::insufficient(self.quantity, quantity));
        }
        self.quantity -= quantity;
        Ok(())
    }
}

/// Sum of quantity over non-expired, positive-quantity batches.
///
/// Saturates at `i64::MAX`.
pub fn available_quantity<'a>(batches: impl IntoIterator<Item = &'a Batch>, today: NaiveDate) -> i64 {
    saturating_total(batches.into_iter().filter(|b| b.is_available(today)))
}

/// Sum of batch quantities, clamped at `i64::MAX`.
pub(crate) fn saturating_total<'a>(batches: impl IntoIterator<Item = &'a Batch>) -> i64 {
    batches
        .into_iter()
        .fold(0i64, |total, b| total.saturating_add(b.quantity))
}

/// Command: receive a new lot into the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveBatch {
    pub product_id: ProductId,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: i64,
    pub cost_price: Decimal,
}

impl ReceiveBatch {
    /// Reject malformed input before anything is read.
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.batch_number.trim().is_empty() {
            return Err(DomainError::validation("batch_number cannot be empty"));
        }
        if self.cost_price < Decimal::ZERO {
            return Err(DomainError::validation("cost_price cannot be negative"));
        }
        Ok(())
    }
}

/// A batch ready to be inserted; the store assigns `sequence`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    pub id: BatchId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub batch_number: String,
    pub quantity: i64,
    pub expiry_date: NaiveDate,
    pub cost_price: Decimal,
    pub received_at: DateTime<Utc>,
    pub source_batch_id: Option<BatchId>,
}

impl NewBatch {
    /// Warehouse receipt. Validates the command first.
    pub fn receipt(
        cmd: &ReceiveBatch,
        warehouse: LocationId,
        received_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        cmd.validate()?;
        Ok(Self {
            id: BatchId::new(),
            product_id: cmd.product_id,
            location_id: warehouse,
            batch_number: cmd.batch_number.trim().to_string(),
            quantity: cmd.quantity,
            expiry_date: cmd.expiry_date,
            cost_price: cmd.cost_price,
            received_at,
            source_batch_id: None,
        })
    }

    /// Destination lot for a transfer: batch number, expiry and cost carry over.
    pub fn transferred_from(
        source: &Batch,
        quantity: i64,
        destination: LocationId,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BatchId::new(),
            product_id: source.product_id,
            location_id: destination,
            batch_number: source.batch_number.clone(),
            quantity,
            expiry_date: source.expiry_date,
            cost_price: source.cost_price,
            received_at,
            source_batch_id: Some(source.id),
        }
    }

    pub fn into_batch(self, sequence: u64) -> Batch {
        Batch {
            id: self.id,
            product_id: self.product_id,
            location_id: self.location_id,
            batch_number: self.batch_number,
            quantity: self.quantity,
            expiry_date: self.expiry_date,
            cost_price: self.cost_price,
            sequence,
            received_at: self.received_at,
            source_batch_id: self.source_batch_id,
        }
    }
}
