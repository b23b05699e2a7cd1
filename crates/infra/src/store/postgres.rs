//! Postgres-backed stock ledger.
//!
//! Each unit of work is one database transaction. Allocation candidates are
//! read with `SELECT ... FOR UPDATE`, so a concurrent sale or transfer of the
//! same product waits until this one commits and then sees the new quantities.
//! `CHECK (quantity >= 0)` on `batches` is the storage-level backstop against
//! overselling.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |-----------------------|------------|----------|
//! | `23505` | `Conflict` | duplicate sku / id |
//! | `40001`, `40P01` | `Conflict` | serialization failure, deadlock |
//! | `23514`, `23503` | `Constraint` | negative quantity, missing parent row |
//! | other | `Backend` | connection failures, decoding errors |

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use pharmacore_core::{BatchId, LocationId, ProductId, SaleId, UserId};
use pharmacore_inventory::{Batch, Location, LocationKind, NewBatch, Product};
use pharmacore_sales::{Sale, SaleItem};

use super::{StockStore, StoreError, UnitOfWork};

const BATCH_COLUMNS: &str = "id, seq, product_id, location_id, batch_number, quantity, expiry_date, \
                             cost_price, received_at, source_batch_id";

#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema migrations shipped with this crate.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PostgresUnitOfWork {
    async fn fetch_batches(&mut self, sql: &str, binds: &[Uuid]) -> Result<Vec<Batch>, StoreError> {
        let mut query = sqlx::query(sql);
        for id in binds {
            query = query.bind(*id);
        }
        let rows = query
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("fetch_batches", e))?;
        decode_all::<BatchRow, Batch>(&rows)
    }

    async fn attach_items(&mut self, headers: Vec<SaleRow>) -> Result<Vec<Sale>, StoreError> {
        let ids: Vec<Uuid> = headers.iter().map(|h| h.id).collect();
        let rows = sqlx::query(
            r#"
            SELECT sale_id, line_no, batch_id, quantity, price
            FROM sale_items
            WHERE sale_id = ANY($1)
            ORDER BY sale_id, line_no
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("sale_items", e))?;

        let mut items: HashMap<SaleId, Vec<SaleItem>> = HashMap::new();
        for item in decode_all::<SaleItemRow, SaleItem>(&rows)? {
            items.entry(item.sale_id).or_default().push(item);
        }

        Ok(headers
            .into_iter()
            .map(|h| {
                let mut sale = Sale::from(h);
                sale.items = items.remove(&sale.id).unwrap_or_default();
                sale
            })
            .collect())
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn locations(&mut self) -> Result<Vec<Location>, StoreError> {
        let rows = sqlx::query("SELECT id, kind FROM locations ORDER BY kind")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("locations", e))?;

        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("id").map_err(|e| map_sqlx_error("locations", e))?;
                let kind: String = row.try_get("kind").map_err(|e| map_sqlx_error("locations", e))?;
                let kind: LocationKind = kind
                    .parse()
                    .map_err(|e| StoreError::Backend(format!("invalid location row: {e}")))?;
                Ok(Location {
                    id: LocationId::from_uuid(id),
                    kind,
                })
            })
            .collect()
    }

    async fn insert_location(&mut self, location: &Location) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO locations (id, kind) VALUES ($1, $2)")
            .bind(location.id.as_uuid())
            .bind(location.kind.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_location", e))?;
        Ok(())
    }

    async fn product_by_sku(&mut self, sku: &str) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT id, sku, name, min_stock FROM products WHERE sku = $1")
            .bind(sku)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("product_by_sku", e))?;
        row.as_ref().map(decode::<ProductRow, Product>).transpose()
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT id, sku, name, min_stock FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("product", e))?;
        row.as_ref().map(decode::<ProductRow, Product>).transpose()
    }

    async fn products(&mut self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query("SELECT id, sku, name, min_stock FROM products ORDER BY sku")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("products", e))?;
        decode_all::<ProductRow, Product>(&rows)
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO products (id, sku, name, min_stock) VALUES ($1, $2, $3, $4)")
            .bind(product.id.as_uuid())
            .bind(&product.sku)
            .bind(&product.name)
            .bind(product.min_stock)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn lock_batches(
        &mut self,
        product_id: ProductId,
        location_id: LocationId,
    ) -> Result<Vec<Batch>, StoreError> {
        let sql = format!(
            "SELECT {BATCH_COLUMNS} FROM batches \
             WHERE product_id = $1 AND location_id = $2 AND quantity > 0 \
             ORDER BY expiry_date ASC, seq ASC \
             FOR UPDATE"
        );
        self.fetch_batches(&sql, &[*product_id.as_uuid(), *location_id.as_uuid()])
            .await
    }

    async fn batches_at(&mut self, location_id: LocationId) -> Result<Vec<Batch>, StoreError> {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM batches WHERE location_id = $1 ORDER BY seq");
        self.fetch_batches(&sql, &[*location_id.as_uuid()]).await
    }

    async fn batch(&mut self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1");
        Ok(self.fetch_batches(&sql, &[*id.as_uuid()]).await?.pop())
    }

    async fn insert_batch(&mut self, batch: NewBatch) -> Result<Batch, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO batches
                (id, product_id, location_id, batch_number, quantity, expiry_date,
                 cost_price, received_at, source_batch_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING seq
            "#,
        )
        .bind(batch.id.as_uuid())
        .bind(batch.product_id.as_uuid())
        .bind(batch.location_id.as_uuid())
        .bind(&batch.batch_number)
        .bind(batch.quantity)
        .bind(batch.expiry_date)
        .bind(batch.cost_price)
        .bind(batch.received_at)
        .bind(batch.source_batch_id.map(Uuid::from))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_batch", e))?;

        let seq: i64 = row.try_get("seq").map_err(|e| map_sqlx_error("insert_batch", e))?;
        Ok(batch.into_batch(seq as u64))
    }

    async fn set_batch_quantity(&mut self, id: BatchId, quantity: i64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE batches SET quantity = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(quantity)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("set_batch_quantity", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Constraint(format!("batch {id} does not exist")));
        }
        Ok(())
    }

    async fn insert_sale(&mut self, sale: &Sale) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO sales (id, user_id, total_amount, created_at) VALUES ($1, $2, $3, $4)")
            .bind(sale.id.as_uuid())
            .bind(sale.user_id.as_uuid())
            .bind(sale.total_amount)
            .bind(sale.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_sale", e))?;
        Ok(())
    }

    async fn insert_sale_item(&mut self, item: &SaleItem) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sale_items (sale_id, line_no, batch_id, quantity, price) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(item.sale_id.as_uuid())
        .bind(item.line_no as i32)
        .bind(item.batch_id.as_uuid())
        .bind(item.quantity)
        .bind(item.price)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_sale_item", e))?;
        Ok(())
    }

    async fn set_sale_total(&mut self, id: SaleId, total: Decimal) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE sales SET total_amount = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(total)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("set_sale_total", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Constraint(format!("sale {id} does not exist")));
        }
        Ok(())
    }

    async fn recent_sales(&mut self, limit: usize) -> Result<Vec<Sale>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, total_amount, created_at FROM sales ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("recent_sales", e))?;

        let headers = rows
            .iter()
            .map(|row| SaleRow::from_row(row).map_err(|e| map_sqlx_error("recent_sales", e)))
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_items(headers).await
    }

    async fn sales_since(&mut self, since: DateTime<Utc>) -> Result<Vec<Sale>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, total_amount, created_at FROM sales WHERE created_at >= $1 ORDER BY created_at",
        )
        .bind(since)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("sales_since", e))?;

        let headers = rows
            .iter()
            .map(|row| SaleRow::from_row(row).map_err(|e| map_sqlx_error("sales_since", e)))
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_items(headers).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PostgresUnitOfWork { tx } = *self;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PostgresUnitOfWork { tx } = *self;
        tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn decode<'r, R, T>(row: &'r PgRow) -> Result<T, StoreError>
where
    R: FromRow<'r, PgRow> + Into<T>,
{
    R::from_row(row)
        .map(Into::into)
        .map_err(|e| StoreError::Backend(format!("failed to decode row: {e}")))
}

fn decode_all<'r, R, T>(rows: &'r [PgRow]) -> Result<Vec<T>, StoreError>
where
    R: FromRow<'r, PgRow> + Into<T>,
{
    rows.iter().map(decode::<R, T>).collect()
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                Some("23514") | Some("23503") => StoreError::Constraint(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

#[derive(Debug)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    min_stock: i64,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            sku: row.try_get("sku")?,
            name: row.try_get("name")?,
            min_stock: row.try_get("min_stock")?,
        })
    }
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: ProductId::from_uuid(row.id),
            sku: row.sku,
            name: row.name,
            min_stock: row.min_stock,
        }
    }
}

#[derive(Debug)]
struct BatchRow {
    id: Uuid,
    seq: i64,
    product_id: Uuid,
    location_id: Uuid,
    batch_number: String,
    quantity: i64,
    expiry_date: NaiveDate,
    cost_price: Decimal,
    received_at: DateTime<Utc>,
    source_batch_id: Option<Uuid>,
}

impl<'r> FromRow<'r, PgRow> for BatchRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BatchRow {
            id: row.try_get("id")?,
            seq: row.try_get("seq")?,
            product_id: row.try_get("product_id")?,
            location_id: row.try_get("location_id")?,
            batch_number: row.try_get("batch_number")?,
            quantity: row.try_get("quantity")?,
            expiry_date: row.try_get("expiry_date")?,
            cost_price: row.try_get("cost_price")?,
            received_at: row.try_get("received_at")?,
            source_batch_id: row.try_get("source_batch_id")?,
        })
    }
}

impl From<BatchRow> for Batch {
    fn from(row: BatchRow) -> Self {
        Batch {
            id: BatchId::from_uuid(row.id),
            product_id: ProductId::from_uuid(row.product_id),
            location_id: LocationId::from_uuid(row.location_id),
            batch_number: row.batch_number,
            quantity: row.quantity,
            expiry_date: row.expiry_date,
            cost_price: row.cost_price,
            sequence: row.seq as u64,
            received_at: row.received_at,
            source_batch_id: row.source_batch_id.map(BatchId::from_uuid),
        }
    }
}

#[derive(Debug)]
struct SaleRow {
    id: Uuid,
    user_id: Uuid,
    total_amount: Decimal,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SaleRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SaleRow {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            total_amount: row.try_get("total_amount")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<SaleRow> for Sale {
    fn from(row: SaleRow) -> Self {
        let mut sale = Sale::open(SaleId::from_uuid(row.id), UserId::from_uuid(row.user_id), row.created_at);
        sale.total_amount = row.total_amount;
        sale
    }
}

#[derive(Debug)]
struct SaleItemRow {
    sale_id: Uuid,
    line_no: i32,
    batch_id: Uuid,
    quantity: i64,
    price: Decimal,
}

impl<'r> FromRow<'r, PgRow> for SaleItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SaleItemRow {
            sale_id: row.try_get("sale_id")?,
            line_no: row.try_get("line_no")?,
            batch_id: row.try_get("batch_id")?,
            quantity: row.try_get("quantity")?,
            price: row.try_get("price")?,
        })
    }
}

impl From<SaleItemRow> for SaleItem {
    fn from(row: SaleItemRow) -> Self {
        SaleItem {
            sale_id: SaleId::from_uuid(row.sale_id),
            line_no: row.line_no as u32,
            batch_id: BatchId::from_uuid(row.batch_id),
            quantity: row.quantity,
            price: row.price,
        }
    }
}
