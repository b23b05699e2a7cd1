//! Infrastructure layer: storage backends, configuration and the stock engine.

pub mod config;
pub mod engine;
pub mod store;

pub use config::{EngineConfig, resolve_locations};
pub use engine::{EngineError, LedgerEnvelope, SaleHistoryEntry, SaleLine, StockEngine};
pub use store::{InMemoryStockStore, PostgresStockStore, StockStore, StoreError, UnitOfWork, seed_locations};

#[cfg(test)]
mod integration_tests;
