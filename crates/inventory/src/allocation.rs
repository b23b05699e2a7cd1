//! Allocation engine: FIFO-by-expiry planning over a set of candidate batches.
//!
//! Planning is a pure read. It never mutates a batch; the coordinator applies
//! the returned plan inside the same unit of work that read the candidates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pharmacore_core::{BatchId, DomainError, DomainResult, ValueObject};

use crate::batch::Batch;

/// One step of an allocation plan: take `quantity_taken` units from a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deduction {
    pub batch_id: BatchId,
    pub batch_number: String,
    pub quantity_taken: i64,
    pub expiry_date: NaiveDate,
}

impl ValueObject for Deduction {}

/// Ordered deductions satisfying (or failing to satisfy) a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub requested: i64,
    pub deductions: Vec<Deduction>,
    /// Units left uncovered once candidates ran out; zero when satisfied.
    pub shortfall: i64,
}

impl AllocationPlan {
    pub fn allocated(&self) -> i64 {
        self.deductions.iter().map(|d| d.quantity_taken).sum()
    }

    pub fn is_satisfied(&self) -> bool {
        self.shortfall == 0
    }

    /// Turn a short plan into `InsufficientStock(have, requested)`.
    pub fn into_result(self) -> DomainResult<Self> {
        if self.is_satisfied() {
            Ok(self)
        } else {
            Err(DomainError::insufficient(self.allocated(), self.requested))
        }
    }
}

/// Zero and negative requests are rejected before anything is read.
pub fn validate_request(requested: i64) -> DomainResult<()> {
    if requested <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

/// Candidates with stock, soonest expiry first; equal expiries keep receipt order.
fn expiry_ordered<'a>(candidates: impl IntoIterator<Item = &'a Batch>) -> Vec<&'a Batch> {
    let mut ordered: Vec<&Batch> = candidates.into_iter().filter(|b| b.quantity > 0).collect();
    ordered.sort_by(|a, b| {
        a.expiry_date
            .cmp(&b.expiry_date)
            .then(a.sequence.cmp(&b.sequence))
    });
    ordered
}

/// Plan a depletion of `requested` units.
///
/// A shortfall is reported in the plan, not as an error: callers decide to
/// abort (`AllocationPlan::into_result`). Partial fulfilment is never applied.
pub fn allocate<'a>(
    candidates: impl IntoIterator<Item = &'a Batch>,
    requested: i64,
) -> DomainResult<AllocationPlan> {
    validate_request(requested)?;

    let mut remaining = requested;
    let mut deductions = Vec::new();
    for batch in expiry_ordered(candidates) {
        if remaining == 0 {
            break;
        }
        let take = batch.quantity.min(remaining);
        deductions.push(Deduction {
            batch_id: batch.id,
            batch_number: batch.batch_number.clone(),
            quantity_taken: take,
            expiry_date: batch.expiry_date,
        });
        remaining -= take;
    }

    Ok(AllocationPlan {
        requested,
        deductions,
        shortfall: remaining,
    })
}

/// Fail closed if any candidate with stock has expired, consumed or not.
///
/// Reports the soonest-expired batch so the error is deterministic.
pub fn ensure_not_expired<'a>(
    candidates: impl IntoIterator<Item = &'a Batch>,
    today: NaiveDate,
) -> DomainResult<()> {
    match expiry_ordered(candidates).into_iter().find(|b| b.is_expired(today)) {
        Some(expired) => Err(DomainError::expired(expired.batch_number.clone(), expired.expiry_date)),
        None => Ok(()),
    }
}
