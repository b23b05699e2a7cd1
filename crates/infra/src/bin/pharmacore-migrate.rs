//! Prepare a Postgres database for the stock engine.
//!
//! Applies the schema migrations, seeds the canonical warehouse and store
//! locations, then checks that a stock engine starts with the configured
//! pricing. Safe to run repeatedly.
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/pharmacy pharmacore-migrate
//! ```

use anyhow::Context;
use tracing::info;

use pharmacore_events::InMemoryEventBus;
use pharmacore_infra::{EngineConfig, LedgerEnvelope, PostgresStockStore, StockEngine, seed_locations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pharmacore_observability::init();

    let config = EngineConfig::from_env();
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set")?;

    info!(max_connections = config.max_connections, "connecting to database");
    let store = PostgresStockStore::connect(database_url, config.max_connections)
        .await
        .context("failed to connect to database")?;

    info!("running migrations");
    store.migrate().await.context("failed to run migrations")?;

    let locations = seed_locations(&store).await.context("failed to seed locations")?;
    for location in &locations {
        info!(kind = %location.kind, location_id = %location.id, "location ready");
    }

    let engine = StockEngine::configured(store, InMemoryEventBus::<LedgerEnvelope>::new(), &config)
        .await
        .context("stock engine cannot start against this database")?;
    info!(markup = %config.markup, floor_price = %config.floor_price, "pricing validated");

    engine.store().pool().close().await;
    info!("database ready");
    Ok(())
}
