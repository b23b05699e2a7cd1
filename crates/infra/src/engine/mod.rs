//! Stock engine: the operations callers invoke against the ledger.
//!
//! Every operation follows the same pipeline:
//!
//! ```text
//! request
//!   ↓
//! 1. Pre-check input (no store access)
//!   ↓
//! 2. Begin unit of work
//!   ↓
//! 3. Fresh read under lock → plan → mutate
//!   ↓
//! 4. Commit (or roll back on any failure)
//!   ↓
//! 5. Publish event (committed operations only)
//! ```
//!
//! Planning and mutation happen inside the same unit of work, so the plan is
//! always computed from the quantities it mutates.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use uuid::Uuid;

use pharmacore_core::{Clock, SystemClock};
use pharmacore_events::{Event, EventBus, EventEnvelope};
use pharmacore_inventory::{Batch, Deduction, Locations, Product};
use pharmacore_sales::{MarkupPricing, PricingPolicy};

use crate::config::{EngineConfig, resolve_locations};
use crate::store::{StockStore, UnitOfWork};

mod catalog;
mod error;
mod history;
mod plan;
mod receive;
mod sell;
mod transfer;

pub use error::EngineError;
pub use history::{DEFAULT_HISTORY_LIMIT, SaleHistoryEntry, SaleLine};

/// Envelope type carried on the engine's event bus.
pub type LedgerEnvelope = EventEnvelope<JsonValue>;

/// Shared entry point for stock operations.
///
/// `Send + Sync`; share it across tasks behind an `Arc`.
pub struct StockEngine<S, B> {
    store: S,
    bus: B,
    locations: Locations,
    pricing: Arc<dyn PricingPolicy>,
    clock: Arc<dyn Clock>,
}

impl<S, B> core::fmt::Debug for StockEngine<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StockEngine")
            .field("locations", &self.locations)
            .field("pricing", &self.pricing)
            .finish_non_exhaustive()
    }
}

impl<S, B> StockEngine<S, B>
where
    S: StockStore,
    B: EventBus<LedgerEnvelope>,
{
    /// Resolve the canonical locations and build an engine with default
    /// pricing and the system clock.
    ///
    /// Fails with `MissingLocation` if the warehouse or store is not seeded.
    pub async fn connect(store: S, bus: B) -> Result<Self, EngineError> {
        let mut uow = store.begin().await?;
        let resolved = resolve_locations(uow.as_mut()).await;
        let locations = discard(uow, resolved).await?;
        debug!(warehouse = %locations.warehouse(), store = %locations.store(), "locations resolved");

        Ok(Self {
            store,
            bus,
            locations,
            pricing: Arc::new(MarkupPricing::default()),
            clock: Arc::new(SystemClock),
        })
    }

    /// `connect`, pricing sales with the markup and floor from `config`.
    ///
    /// Fails with `Validation` before touching the store if the configured
    /// pricing is unusable.
    pub async fn configured(store: S, bus: B, config: &EngineConfig) -> Result<Self, EngineError> {
        let pricing = config.pricing()?;
        Ok(Self::connect(store, bus).await?.with_pricing(pricing))
    }

    pub fn with_pricing(mut self, pricing: impl PricingPolicy + 'static) -> Self {
        self.pricing = Arc::new(pricing);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn locations(&self) -> Locations {
        self.locations
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Publish after commit. Failures are logged, never returned: the change
    /// is already durable.
    fn publish<E>(&self, subject_id: Uuid, subject_type: &'static str, event: &E)
    where
        E: Event + Serialize,
    {
        let envelope = match EventEnvelope::from_typed(subject_id, subject_type, event) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, event_type = event.event_type(), "failed to serialize event");
                return;
            }
        };
        let event_id = envelope.event_id();
        if let Err(err) = self.bus.publish(envelope) {
            warn!(error = ?err, %event_id, event_type = event.event_type(), "failed to publish event");
        }
    }
}

/// Commit on success, roll back on failure.
async fn finish<T>(uow: Box<dyn UnitOfWork>, outcome: Result<T, EngineError>) -> Result<T, EngineError> {
    match outcome {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = uow.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            warn!(error = %err, "unit of work aborted");
            Err(err)
        }
    }
}

/// Roll back unconditionally (read-only operations).
async fn discard<T>(uow: Box<dyn UnitOfWork>, outcome: Result<T, EngineError>) -> Result<T, EngineError> {
    if let Err(rollback) = uow.rollback().await {
        warn!(error = %rollback, "rollback failed");
    }
    outcome
}

async fn require_product(uow: &mut dyn UnitOfWork, sku: &str) -> Result<Product, EngineError> {
    uow.product_by_sku(sku)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("product with sku {sku}")))
}

/// The locked candidate a deduction was planned against.
fn planned_batch<'a>(candidates: &'a [Batch], deduction: &Deduction) -> Result<&'a Batch, EngineError> {
    candidates
        .iter()
        .find(|b| b.id == deduction.batch_id)
        .ok_or_else(|| EngineError::NotFound(format!("batch {}", deduction.batch_id)))
}
