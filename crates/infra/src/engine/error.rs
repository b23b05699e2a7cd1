use chrono::NaiveDate;
use thiserror::Error;

use pharmacore_core::DomainError;
use pharmacore_inventory::LocationKind;

use crate::store::StoreError;

/// Failure of a stock engine operation.
///
/// Every variant means the ledger is exactly as it was before the call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A store batch still holding stock is past its expiry date.
    #[error("batch {batch_number} expired on {expiry_date}")]
    ExpiredBatch {
        batch_number: String,
        expiry_date: NaiveDate,
    },

    #[error("insufficient stock: have {have}, requested {requested}")]
    InsufficientStock { have: i64, requested: i64 },

    /// Duplicate sku or location.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The unit of work could not complete (commit conflict, storage fault).
    #[error("transaction aborted: {0}")]
    TransactionAbort(#[source] StoreError),

    #[error("no {0} location is configured")]
    MissingLocation(LocationKind),
}

impl EngineError {
    /// Bad input: a malformed request, or amounts too large to price.
    pub fn is_pre_check(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }

    /// Retrying the same call may succeed; every other failure is deterministic
    /// for the current ledger state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::TransactionAbort(StoreError::Conflict(_)))
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => EngineError::Validation(msg),
            DomainError::InvalidId(msg) => EngineError::Validation(msg),
            DomainError::NotFound(what) => EngineError::NotFound(what),
            DomainError::ExpiredBatch {
                batch_number,
                expiry_date,
            } => EngineError::ExpiredBatch {
                batch_number,
                expiry_date,
            },
            DomainError::InsufficientStock { have, requested } => {
                EngineError::InsufficientStock { have, requested }
            }
            DomainError::Conflict(msg) => EngineError::Conflict(msg),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        EngineError::TransactionAbort(value)
    }
}
