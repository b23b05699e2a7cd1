//! `pharmacore-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the stock ledger,
//! sales ledger and the transaction engine (no infrastructure concerns).

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{BatchId, LocationId, ProductId, SaleId, UserId};
pub use value_object::ValueObject;
