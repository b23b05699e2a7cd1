//! Integration tests for the stock engine against the in-memory ledger.
//!
//! Tests: request → StockEngine → UnitOfWork → commit → EventBus
//!
//! Verifies:
//! - FIFO-by-expiry allocation for sales and transfers
//! - Failed operations leave the ledger untouched
//! - Concurrent sales never oversell

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::mpsc;

    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use pharmacore_core::{BatchId, FixedClock, LocationId, ProductId, UserId};
    use pharmacore_events::{EventBus, InMemoryEventBus, Subscription};
    use pharmacore_inventory::{Batch, LocationKind, NewBatch, NewProduct, Product, ReceiveBatch};
    use pharmacore_sales::SaleStatus;

    use crate::config::EngineConfig;
    use crate::engine::{EngineError, LedgerEnvelope, StockEngine};
    use crate::store::{InMemoryStockStore, StockStore, StoreError, seed_locations};

    type Bus = Arc<InMemoryEventBus<LedgerEnvelope>>;
    type Engine = StockEngine<InMemoryStockStore, Bus>;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2023, 6, 1)
    }

    fn cost(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    async fn setup() -> (Engine, InMemoryStockStore, Bus) {
        let store = InMemoryStockStore::new();
        seed_locations(&store).await.unwrap();
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let engine = StockEngine::connect(store.clone(), bus.clone())
            .await
            .unwrap()
            .with_clock(FixedClock::on(today()));
        (engine, store, bus)
    }

    async fn panadol(engine: &Engine) -> Product {
        engine
            .create_product(NewProduct::new("PAN-001", "Panadol 500mg", 5))
            .await
            .unwrap()
    }

    /// Write a batch straight into the ledger, bypassing the engine.
    async fn put_batch(
        store: &InMemoryStockStore,
        product_id: ProductId,
        location_id: LocationId,
        number: &str,
        quantity: i64,
        expiry: NaiveDate,
    ) -> Batch {
        let mut uow = store.begin().await.unwrap();
        let batch = uow
            .insert_batch(NewBatch {
                id: BatchId::new(),
                product_id,
                location_id,
                batch_number: number.to_string(),
                quantity,
                expiry_date: expiry,
                cost_price: cost(500),
                received_at: Utc::now(),
                source_batch_id: None,
            })
            .await
            .unwrap();
        uow.commit().await.unwrap();
        batch
    }

    async fn quantity_of(store: &InMemoryStockStore, id: BatchId) -> i64 {
        store
            .batches()
            .await
            .into_iter()
            .find(|b| b.id == id)
            .map(|b| b.quantity)
            .unwrap()
    }

    // -- sales -------------------------------------------------------------

    #[tokio::test]
    async fn sale_drains_soonest_expiry_first() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        let shelf = engine.locations().store();
        let new = put_batch(&store, product.id, shelf, "NEW", 10, date(2025, 1, 1)).await;
        let old = put_batch(&store, product.id, shelf, "OLD", 10, date(2024, 1, 1)).await;

        let receipt = engine.sell("PAN-001", 15, UserId::new()).await.unwrap();

        assert_eq!(receipt.status, SaleStatus::Success);
        assert_eq!(receipt.message, "Sold 15 units using FIFO.");
        let taken: Vec<(&str, i64)> = receipt
            .details
            .iter()
            .map(|d| (d.batch_number.as_str(), d.quantity_taken))
            .collect();
        assert_eq!(taken, vec![("OLD", 10), ("NEW", 5)]);
        assert_eq!(quantity_of(&store, old.id).await, 0);
        assert_eq!(quantity_of(&store, new.id).await, 5);

        // 5.00 cost at 1.5 markup.
        assert_eq!(receipt.total_amount, Decimal::new(11250, 2));

        let sales = store.sales().await;
        assert_eq!(sales.len(), 1);
        let items: Vec<(BatchId, i64)> = sales[0].items.iter().map(|i| (i.batch_id, i.quantity)).collect();
        assert_eq!(items, vec![(old.id, 10), (new.id, 5)]);
        assert_eq!(sales[0].total_amount, receipt.total_amount);
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_ledger_untouched() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        let shelf = engine.locations().store();
        put_batch(&store, product.id, shelf, "OLD", 10, date(2024, 1, 1)).await;
        put_batch(&store, product.id, shelf, "NEW", 10, date(2025, 1, 1)).await;
        let before = store.batches().await;

        let err = engine.sell("PAN-001", 25, UserId::new()).await.unwrap_err();

        assert_eq!(err, EngineError::InsufficientStock { have: 20, requested: 25 });
        assert_eq!(store.batches().await, before);
        assert!(store.sales().await.is_empty());
    }

    #[tokio::test]
    async fn expired_store_batch_refuses_the_sale() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        put_batch(&store, product.id, engine.locations().store(), "EXP", 5, date(2020, 1, 1)).await;
        let before = store.batches().await;

        let err = engine.sell("PAN-001", 1, UserId::new()).await.unwrap_err();

        assert_eq!(
            err,
            EngineError::ExpiredBatch {
                batch_number: "EXP".to_string(),
                expiry_date: date(2020, 1, 1),
            }
        );
        assert_eq!(store.batches().await, before);
        assert!(store.sales().await.is_empty());
    }

    #[tokio::test]
    async fn expired_stock_blocks_the_sale_even_when_fresh_stock_covers_it() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        let shelf = engine.locations().store();
        put_batch(&store, product.id, shelf, "FRESH", 50, date(2026, 1, 1)).await;
        put_batch(&store, product.id, shelf, "EXP", 1, date(2023, 5, 31)).await;

        let err = engine.sell("PAN-001", 1, UserId::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::ExpiredBatch { ref batch_number, .. } if batch_number == "EXP"));
    }

    #[tokio::test]
    async fn stock_expiring_today_is_still_sellable() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        put_batch(&store, product.id, engine.locations().store(), "TODAY", 3, today()).await;

        let receipt = engine.sell("PAN-001", 3, UserId::new()).await.unwrap();
        assert_eq!(receipt.details.len(), 1);
    }

    #[tokio::test]
    async fn equal_expiries_are_sold_in_receipt_order() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        let shelf = engine.locations().store();
        let first = put_batch(&store, product.id, shelf, "FIRST", 4, date(2025, 1, 1)).await;
        let second = put_batch(&store, product.id, shelf, "SECOND", 4, date(2025, 1, 1)).await;

        let receipt = engine.sell("PAN-001", 5, UserId::new()).await.unwrap();

        assert_eq!(receipt.details[0].batch_id, first.id);
        assert_eq!(receipt.details[0].quantity_taken, 4);
        assert_eq!(receipt.details[1].batch_id, second.id);
        assert_eq!(receipt.details[1].quantity_taken, 1);
    }

    #[tokio::test]
    async fn sale_ignores_warehouse_stock() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        put_batch(&store, product.id, engine.locations().warehouse(), "W-1", 100, date(2025, 1, 1)).await;

        let err = engine.sell("PAN-001", 1, UserId::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected_before_reading() {
        let (engine, _store, _bus) = setup().await;

        let err = engine.sell("PAN-001", 0, UserId::new()).await.unwrap_err();
        assert!(err.is_pre_check());

        let err = engine.transfer("PAN-001", -3).await.unwrap_err();
        assert!(err.is_pre_check());

        let err = engine.sell("NOPE-404", 1, UserId::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert!(!err.is_pre_check());
    }

    /// Receive a warehouse lot and move all of it to the store.
    async fn stock_store(engine: &Engine, product: &Product, quantity: i64, cost_price: Decimal) {
        engine
            .receive(ReceiveBatch {
                product_id: product.id,
                batch_number: "LOT-1".to_string(),
                expiry_date: date(2026, 12, 31),
                quantity,
                cost_price,
            })
            .await
            .unwrap();
        engine.transfer(&product.sku, quantity).await.unwrap();
    }

    #[tokio::test]
    async fn zero_cost_stock_sells_at_the_floor_price() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        stock_store(&engine, &product, 5, Decimal::ZERO).await;

        let receipt = engine.sell("PAN-001", 3, UserId::new()).await.unwrap();

        assert_eq!(receipt.total_amount, Decimal::new(300, 2));
        let sales = store.sales().await;
        assert!(sales[0].items.iter().all(|i| i.price == Decimal::ONE));
    }

    #[tokio::test]
    async fn unpriceable_sale_is_refused_and_rolled_back() {
        let (engine, store, bus) = setup().await;
        let product = panadol(&engine).await;
        let huge_cost = Decimal::from_i128_with_scale(100_000_000_000_000_000_000, 0);
        stock_store(&engine, &product, 1_000_000_000, huge_cost).await;
        let before = store.batches().await;
        let feed = bus.subscribe();

        let err = engine.sell("PAN-001", 1_000_000_000, UserId::new()).await.unwrap_err();

        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(store.batches().await, before);
        assert!(store.sales().await.is_empty());
        assert!(feed.try_recv().is_err());
    }

    #[tokio::test]
    async fn configured_pricing_is_applied_to_sales() {
        let store = InMemoryStockStore::new();
        seed_locations(&store).await.unwrap();
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let config = EngineConfig {
            markup: Decimal::new(2, 0),
            ..EngineConfig::default()
        };
        let engine = StockEngine::configured(store.clone(), bus, &config)
            .await
            .unwrap()
            .with_clock(FixedClock::on(today()));
        let product = panadol(&engine).await;
        put_batch(&store, product.id, engine.locations().store(), "S", 5, date(2025, 1, 1)).await;

        let receipt = engine.sell("PAN-001", 2, UserId::new()).await.unwrap();

        // 5.00 cost at 2x markup.
        assert_eq!(receipt.total_amount, Decimal::new(2000, 2));
    }

    #[tokio::test]
    async fn unusable_configured_pricing_is_rejected() {
        let store = InMemoryStockStore::new();
        seed_locations(&store).await.unwrap();
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let config = EngineConfig {
            floor_price: Decimal::ZERO,
            ..EngineConfig::default()
        };

        let err = StockEngine::configured(store, bus, &config).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    // -- transfers ---------------------------------------------------------

    #[tokio::test]
    async fn transfer_moves_stock_and_keeps_provenance() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        let source = engine
            .receive(ReceiveBatch {
                product_id: product.id,
                batch_number: "W-2026".to_string(),
                expiry_date: date(2026, 12, 31),
                quantity: 10,
                cost_price: cost(500),
            })
            .await
            .unwrap();

        let receipt = engine.transfer("PAN-001", 10).await.unwrap();

        assert_eq!(receipt.message, "Transferred 10 units of PAN-001 to store.");
        assert_eq!(quantity_of(&store, source.id).await, 0);
        assert_eq!(receipt.created.len(), 1);
        let moved = &receipt.created[0];
        assert_eq!(moved.location_id, engine.locations().store());
        assert_eq!(moved.quantity, 10);
        assert_eq!(moved.expiry_date, date(2026, 12, 31));
        assert_eq!(moved.cost_price, cost(500));
        assert_eq!(moved.batch_number, "W-2026");
        assert_eq!(moved.source_batch_id, Some(source.id));

        // The transferred stock is now sellable.
        let sale = engine.sell("PAN-001", 4, UserId::new()).await.unwrap();
        assert_eq!(sale.details[0].batch_id, moved.id);
    }

    #[tokio::test]
    async fn transfer_conserves_quantity() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        let warehouse = engine.locations().warehouse();
        put_batch(&store, product.id, warehouse, "A", 4, date(2024, 3, 1)).await;
        put_batch(&store, product.id, warehouse, "B", 6, date(2024, 2, 1)).await;
        put_batch(&store, product.id, warehouse, "C", 8, date(2024, 4, 1)).await;

        let receipt = engine.transfer("PAN-001", 12).await.unwrap();

        let deducted: i64 = receipt.deductions.iter().map(|d| d.quantity_taken).sum();
        let credited: i64 = receipt.created.iter().map(|b| b.quantity).sum();
        assert_eq!(deducted, 12);
        assert_eq!(credited, 12);

        let order: Vec<&str> = receipt.deductions.iter().map(|d| d.batch_number.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);

        let batches = store.batches().await;
        let at = |location: LocationId| -> i64 {
            batches.iter().filter(|b| b.location_id == location).map(|b| b.quantity).sum()
        };
        assert_eq!(at(warehouse), 6);
        assert_eq!(at(engine.locations().store()), 12);
    }

    #[tokio::test]
    async fn transfer_leaves_expired_warehouse_stock_behind() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        put_batch(&store, product.id, engine.locations().warehouse(), "OLD", 10, date(2022, 1, 1)).await;
        let before = store.batches().await;

        let err = engine.transfer("PAN-001", 1).await.unwrap_err();

        assert_eq!(err, EngineError::InsufficientStock { have: 0, requested: 1 });
        assert_eq!(store.batches().await, before);
    }

    #[tokio::test]
    async fn transfer_shortfall_moves_nothing() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        put_batch(&store, product.id, engine.locations().warehouse(), "W", 5, date(2025, 1, 1)).await;
        let before = store.batches().await;

        let err = engine.transfer("PAN-001", 6).await.unwrap_err();

        assert_eq!(err, EngineError::InsufficientStock { have: 5, requested: 6 });
        assert_eq!(store.batches().await, before);
    }

    #[tokio::test]
    async fn transfer_of_unknown_sku_is_not_found() {
        let (engine, store, _bus) = setup().await;
        panadol(&engine).await;

        let err = engine.transfer("NOPE-404", 1).await.unwrap_err();

        assert!(matches!(err, EngineError::NotFound(_)));
        assert!(store.batches().await.is_empty());
    }

    // -- receipts and catalog ----------------------------------------------

    #[tokio::test]
    async fn receipt_requires_a_known_product() {
        let (engine, store, _bus) = setup().await;

        let err = engine
            .receive(ReceiveBatch {
                product_id: ProductId::new(),
                batch_number: "B-1".to_string(),
                expiry_date: date(2025, 1, 1),
                quantity: 5,
                cost_price: cost(100),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::NotFound(_)));
        assert!(store.batches().await.is_empty());
    }

    #[tokio::test]
    async fn receipt_rejects_malformed_input() {
        let (engine, _store, _bus) = setup().await;
        let product = panadol(&engine).await;

        let err = engine
            .receive(ReceiveBatch {
                product_id: product.id,
                batch_number: "B-1".to_string(),
                expiry_date: date(2025, 1, 1),
                quantity: 0,
                cost_price: cost(100),
            })
            .await
            .unwrap_err();
        assert!(err.is_pre_check());
    }

    #[tokio::test]
    async fn duplicate_sku_is_a_conflict() {
        let (engine, _store, _bus) = setup().await;
        panadol(&engine).await;

        let err = engine
            .create_product(NewProduct::new("  PAN-001 ", "Another", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn connect_requires_both_locations() {
        let store = InMemoryStockStore::new();
        let bus: Bus = Arc::new(InMemoryEventBus::new());

        let err = StockEngine::connect(store, bus).await.unwrap_err();
        assert_eq!(err, EngineError::MissingLocation(LocationKind::Warehouse));
    }

    #[tokio::test]
    async fn seeding_locations_is_idempotent() {
        let store = InMemoryStockStore::new();
        let first = seed_locations(&store).await.unwrap();
        let second = seed_locations(&store).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn overview_flags_low_store_stock() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        put_batch(&store, product.id, engine.locations().warehouse(), "W", 40, date(2025, 1, 1)).await;
        put_batch(&store, product.id, engine.locations().store(), "S", 3, date(2025, 1, 1)).await;
        put_batch(&store, product.id, engine.locations().store(), "X", 2, date(2022, 1, 1)).await;

        let levels = engine.stock_overview().await.unwrap();

        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].location, LocationKind::Warehouse);
        assert_eq!(levels[0].available, 40);
        assert!(!levels[0].low_stock);
        assert_eq!(levels[1].location, LocationKind::Store);
        assert_eq!(levels[1].available, 3);
        assert_eq!(levels[1].expired, 2);
        assert!(levels[1].low_stock);
    }

    #[tokio::test]
    async fn overview_clamps_stock_that_exceeds_the_counter() {
        let (engine, _store, _bus) = setup().await;
        let product = panadol(&engine).await;
        for number in ["BULK-1", "BULK-2"] {
            engine
                .receive(ReceiveBatch {
                    product_id: product.id,
                    batch_number: number.to_string(),
                    expiry_date: date(2026, 12, 31),
                    quantity: i64::MAX,
                    cost_price: cost(100),
                })
                .await
                .unwrap();
        }

        let levels = engine.stock_overview().await.unwrap();

        assert_eq!(levels[0].location, LocationKind::Warehouse);
        assert_eq!(levels[0].available, i64::MAX);
        assert_eq!(levels[0].batch_count, 2);
    }

    #[tokio::test]
    async fn plan_previews_without_mutating() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        put_batch(&store, product.id, engine.locations().warehouse(), "W", 5, date(2025, 1, 1)).await;
        let before = store.batches().await;

        let plan = engine.plan("PAN-001", LocationKind::Warehouse, 8).await.unwrap();

        assert_eq!(plan.allocated(), 5);
        assert_eq!(plan.shortfall, 3);
        assert_eq!(store.batches().await, before);
    }

    // -- history -----------------------------------------------------------

    #[tokio::test]
    async fn history_lists_newest_sales_with_readable_lines() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        put_batch(&store, product.id, engine.locations().store(), "S-1", 20, date(2025, 1, 1)).await;

        let first = engine.sell("PAN-001", 2, UserId::new()).await.unwrap();
        let second = engine.sell("PAN-001", 3, UserId::new()).await.unwrap();

        let history = engine.sales_history(1).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sale_id, second.sale_id);

        let history = engine.sales_history(20).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].sale_id, first.sale_id);
        let line = &history[0].lines[0];
        assert_eq!(line.sku, "PAN-001");
        assert_eq!(line.product_name, "Panadol 500mg");
        assert_eq!(line.batch_number, "S-1");
        assert_eq!(line.quantity, 3);

        assert!(engine.sales_history(0).await.unwrap_err().is_pre_check());
    }

    #[tokio::test]
    async fn daily_sales_counts_todays_units() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        put_batch(&store, product.id, engine.locations().store(), "S-1", 20, date(2025, 1, 1)).await;
        engine.sell("PAN-001", 2, UserId::new()).await.unwrap();
        engine.sell("PAN-001", 5, UserId::new()).await.unwrap();

        let stats = engine.daily_sales(7).await.unwrap();

        assert_eq!(stats.len(), 7);
        assert_eq!(stats[6].date, today());
        assert_eq!(stats[6].quantity, 7);
        assert!(stats[..6].iter().all(|d| d.quantity == 0));
    }

    // -- events ------------------------------------------------------------

    #[tokio::test]
    async fn committed_sale_is_published() {
        let (engine, store, bus) = setup().await;
        let product = panadol(&engine).await;
        put_batch(&store, product.id, engine.locations().store(), "S-1", 5, date(2025, 1, 1)).await;
        let subscription = bus.subscribe();

        let receipt = engine.sell("PAN-001", 2, UserId::new()).await.unwrap();

        let envelopes = subscription.drain();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].event_type(), "sales.sale.completed");
        assert_eq!(envelopes[0].subject_id(), *receipt.sale_id.as_uuid());
        assert_eq!(envelopes[0].payload()["SaleCompleted"]["quantity"], 2);
    }

    #[tokio::test]
    async fn failed_operations_publish_nothing() {
        let (engine, _store, bus) = setup().await;
        panadol(&engine).await;
        let subscription = bus.subscribe();

        assert!(engine.sell("PAN-001", 1, UserId::new()).await.is_err());
        assert!(engine.transfer("PAN-001", 1).await.is_err());

        assert!(subscription.drain().is_empty());
    }

    #[derive(Debug, Default)]
    struct OfflineBus;

    impl EventBus<LedgerEnvelope> for OfflineBus {
        type Error = &'static str;

        fn publish(&self, _message: LedgerEnvelope) -> Result<(), Self::Error> {
            Err("bus offline")
        }

        fn subscribe(&self) -> Subscription<LedgerEnvelope> {
            let (_tx, rx) = mpsc::channel();
            Subscription::new(rx)
        }
    }

    #[tokio::test]
    async fn publish_failure_does_not_undo_a_sale() {
        let store = InMemoryStockStore::new();
        seed_locations(&store).await.unwrap();
        let engine = StockEngine::connect(store.clone(), OfflineBus)
            .await
            .unwrap()
            .with_clock(FixedClock::on(today()));
        let product = engine
            .create_product(NewProduct::new("PAN-001", "Panadol 500mg", 0))
            .await
            .unwrap();
        let batch = put_batch(&store, product.id, engine.locations().store(), "S-1", 5, date(2025, 1, 1)).await;

        engine.sell("PAN-001", 5, UserId::new()).await.unwrap();

        assert_eq!(quantity_of(&store, batch.id).await, 0);
        assert_eq!(store.sales().await.len(), 1);
    }

    // -- atomicity and concurrency -----------------------------------------

    #[tokio::test]
    async fn commit_failure_leaves_no_trace() {
        let (engine, store, bus) = setup().await;
        let product = panadol(&engine).await;
        put_batch(&store, product.id, engine.locations().store(), "S-1", 10, date(2025, 1, 1)).await;
        let before = store.batches().await;
        let subscription = bus.subscribe();

        store.fail_next_commit();
        let err = engine.sell("PAN-001", 4, UserId::new()).await.unwrap_err();

        assert!(matches!(err, EngineError::TransactionAbort(StoreError::Conflict(_))));
        assert!(err.is_retryable());
        assert_eq!(store.batches().await, before);
        assert!(store.sales().await.is_empty());
        assert!(subscription.drain().is_empty());

        // The caller retries and the sale goes through.
        engine.sell("PAN-001", 4, UserId::new()).await.unwrap();
        assert_eq!(store.sales().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sales_never_oversell() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        let shelf = engine.locations().store();
        put_batch(&store, product.id, shelf, "A", 6, date(2024, 1, 1)).await;
        put_batch(&store, product.id, shelf, "B", 4, date(2025, 1, 1)).await;
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.sell("PAN-001", 1, UserId::new()).await })
            })
            .collect();

        let mut sold = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(receipt) => sold += receipt.details.iter().map(|d| d.quantity_taken).sum::<i64>(),
                // Once every batch is drained the store has no eligible stock left.
                Err(EngineError::NotFound(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(sold, 10);
        assert!(store.batches().await.iter().all(|b| b.quantity == 0));
        assert_eq!(store.sales().await.len(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transfers_and_sales_conserve_stock() {
        let (engine, store, _bus) = setup().await;
        let product = panadol(&engine).await;
        put_batch(&store, product.id, engine.locations().warehouse(), "W", 30, date(2025, 1, 1)).await;
        put_batch(&store, product.id, engine.locations().store(), "S", 10, date(2025, 1, 1)).await;
        let engine = Arc::new(engine);

        let mut handles = Vec::new();
        for i in 0..20 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    engine.transfer("PAN-001", 3).await.map(|r| (0, r.quantity))
                } else {
                    engine.sell("PAN-001", 2, UserId::new()).await.map(|_| (2, 0))
                }
            }));
        }

        let mut sold = 0;
        for handle in handles {
            if let Ok((s, _moved)) = handle.await.unwrap() {
                sold += s;
            }
        }

        let remaining: i64 = store.batches().await.iter().map(|b| b.quantity).sum();
        assert_eq!(remaining + sold, 40);
        assert!(store.batches().await.iter().all(|b| b.quantity >= 0));
    }
}
