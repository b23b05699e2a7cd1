//! Configuration loading and representation.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PHARMACORE_MARKUP` | `1.5` |
//! | `PHARMACORE_FLOOR_PRICE` | `1.00` |
//! | `DATABASE_URL` | none (in-memory ledger) |
//! | `PHARMACORE_DB_MAX_CONNECTIONS` | `10` |
//!
//! `StockEngine::configured` applies the pricing settings.

use core::str::FromStr;

use rust_decimal::Decimal;
use tracing::warn;

use pharmacore_inventory::{LocationKind, Locations};
use pharmacore_sales::MarkupPricing;

use crate::engine::EngineError;
use crate::store::UnitOfWork;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub markup: Decimal,
    pub floor_price: Decimal,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            markup: MarkupPricing::default_markup(),
            floor_price: MarkupPricing::default_floor_price(),
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source. Unparseable values fall back to the
    /// default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            markup: parsed(&lookup, "PHARMACORE_MARKUP", defaults.markup),
            floor_price: parsed(&lookup, "PHARMACORE_FLOOR_PRICE", defaults.floor_price),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections: parsed(&lookup, "PHARMACORE_DB_MAX_CONNECTIONS", defaults.max_connections),
        }
    }

    pub fn pricing(&self) -> Result<MarkupPricing, EngineError> {
        Ok(MarkupPricing::new(self.markup, self.floor_price)?)
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + core::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, default = %default, "invalid configuration value, using default");
                default
            }
        },
    }
}

/// Resolve the canonical warehouse and store.
///
/// Fails with `MissingLocation` when either is absent.
pub async fn resolve_locations(uow: &mut dyn UnitOfWork) -> Result<Locations, EngineError> {
    let locations = uow.locations().await?;
    let find = |kind: LocationKind| {
        locations
            .iter()
            .find(|l| l.kind == kind)
            .map(|l| l.id)
            .ok_or(EngineError::MissingLocation(kind))
    };
    Ok(Locations::new(find(LocationKind::Warehouse)?, find(LocationKind::Store)?))
}
