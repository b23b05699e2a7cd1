//! Domain error model.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// missing records, expired or insufficient stock). Storage faults belong to
/// the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. non-positive quantity, blank SKU, an
    /// amount too large to represent).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A required record could not be resolved.
    #[error("not found: {0}")]
    NotFound(String),

    /// A candidate batch is past its expiry date; the whole request is refused.
    #[error("batch {batch_number} expired on {expiry_date}")]
    ExpiredBatch {
        batch_number: String,
        expiry_date: NaiveDate,
    },

    /// Available stock does not cover the request.
    #[error("insufficient stock: have {have}, requested {requested}")]
    InsufficientStock { have: i64, requested: i64 },

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A uniqueness or state conflict (e.g. duplicate SKU).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn expired(batch_number: impl Into<String>, expiry_date: NaiveDate) -> Self {
        Self::ExpiredBatch {
            batch_number: batch_number.into(),
            expiry_date,
        }
    }

    pub fn insufficient(have: i64, requested: i64) -> Self {
        Self::InsufficientStock { have, requested }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Rejected as bad input (malformed request or unrepresentable amount).
    pub fn is_pre_check(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidId(_))
    }
}
