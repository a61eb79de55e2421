//! Postgres-backed catalog store.
//!
//! Three tables keyed by item identity (`items`, `price_history`,
//! `stock_movements`); ledger rows reference their item with
//! `ON DELETE CASCADE`, so deleting an item removes both ledgers in the same
//! statement.
//!
//! ## Locking
//!
//! [`CatalogStore::begin`] opens a transaction, sets a transaction-local
//! `lock_timeout` and takes `SELECT ... FOR UPDATE` on the item row. Every
//! other writer of that item blocks on the same row lock until commit or
//! rollback, which serializes the read-aggregate-then-append sequence of a
//! reconciliation.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |-----------------------|------------|----------|
//! | `55P03` lock_not_available | `Conflict` | item lock not granted within `lock_timeout` |
//! | `40001` / `40P01` | `Conflict` | serialization failure / deadlock |
//! | `23505` unique violation | `Conflict` | two creations of the same item id raced |
//! | `23503` / `23514` | `Integrity` | ledger row without item, failed check constraint |
//! | anything else | `Backend` | network errors, pool closed, ... |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use stockrecon_core::ItemId;
use stockrecon_ledger::{
    Item, MovementKind, NewMovement, NewPriceEntry, Price, PriceHistoryEntry, StockMovementEntry,
};

use super::in_memory::DEFAULT_LOCK_TIMEOUT;
use super::query::DateRange;
use super::r#trait::{CatalogStore, ItemTransaction, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_item_ledgers.sql");

/// Postgres-backed implementation of [`CatalogStore`].
#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema (idempotent).
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn begin(&self, item_id: ItemId) -> Result<Box<dyn ItemTransaction>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        let row = sqlx::query(
            r#"
            SELECT id, price, stock, version, created_at, updated_at
            FROM items
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_item", e))?;

        let item = row.as_ref().map(item_from_row).transpose()?;

        Ok(Box::new(PostgresTransaction {
            tx: Some(tx),
            item_id,
            item,
        }))
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, price, stock, version, created_at, updated_at
            FROM items
            WHERE id = $1
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn price_history(
        &self,
        item_id: ItemId,
        range: DateRange,
    ) -> Result<Vec<PriceHistoryEntry>, StoreError> {
        let (start, end) = range.bounds();
        let rows = sqlx::query(
            r#"
            SELECT sequence, item_id, price, recorded_at
            FROM price_history
            WHERE item_id = $1
              AND ($2::timestamptz IS NULL OR recorded_at >= $2)
              AND ($3::timestamptz IS NULL OR recorded_at < $3)
            ORDER BY recorded_at DESC, sequence DESC
            "#,
        )
        .bind(item_id.as_uuid())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("price_history", e))?;

        rows.iter().map(price_from_row).collect()
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn stock_movements(&self, item_id: ItemId) -> Result<Vec<StockMovementEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, item_id, kind, quantity, reason, moved_at
            FROM stock_movements
            WHERE item_id = $1
            ORDER BY moved_at DESC, sequence DESC
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock_movements", e))?;

        rows.iter().map(movement_from_row).collect()
    }

    async fn movement_balance(&self, item_id: ItemId) -> Result<i64, StoreError> {
        let row = sqlx::query(BALANCE_SQL)
            .bind(item_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("movement_balance", e))?;
        balance_from_row(&row)
    }

    async fn latest_prices(&self) -> Result<Vec<PriceHistoryEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT DISTINCT ON (item_id) sequence, item_id, price, recorded_at
                FROM price_history
                ORDER BY item_id, recorded_at DESC, sequence DESC
            ) latest
            ORDER BY recorded_at DESC, sequence DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest_prices", e))?;

        rows.iter().map(price_from_row).collect()
    }
}

const BALANCE_SQL: &str = r#"
    SELECT COALESCE(SUM(CASE WHEN kind = 'IN' THEN quantity ELSE -quantity END), 0)::BIGINT AS balance
    FROM stock_movements
    WHERE item_id = $1
"#;

/// Unit of work holding the item's row lock until commit or drop.
///
/// Dropping an uncommitted `sqlx::Transaction` rolls it back.
struct PostgresTransaction {
    tx: Option<Transaction<'static, Postgres>>,
    item_id: ItemId,
    item: Option<Item>,
}

impl PostgresTransaction {
    fn conn(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx
            .as_mut()
            .ok_or_else(|| StoreError::Backend("transaction already committed".to_string()))
    }

    fn ensure_same_item(&self, other: ItemId) -> Result<(), StoreError> {
        if other != self.item_id {
            return Err(StoreError::Integrity(format!(
                "transaction on item {} cannot write item {other}",
                self.item_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ItemTransaction for PostgresTransaction {
    fn item_id(&self) -> ItemId {
        self.item_id
    }

    async fn item(&mut self) -> Result<Option<Item>, StoreError> {
        self.conn()?;
        Ok(self.item.clone())
    }

    async fn latest_price(&mut self) -> Result<Option<PriceHistoryEntry>, StoreError> {
        let item_id = self.item_id;
        let tx = self.conn()?;
        let row = sqlx::query(
            r#"
            SELECT sequence, item_id, price, recorded_at
            FROM price_history
            WHERE item_id = $1
            ORDER BY recorded_at DESC, sequence DESC
            LIMIT 1
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("latest_price", e))?;

        row.as_ref().map(price_from_row).transpose()
    }

    async fn movement_balance(&mut self) -> Result<i64, StoreError> {
        let item_id = self.item_id;
        let tx = self.conn()?;
        let row = sqlx::query(BALANCE_SQL)
            .bind(item_id.as_uuid())
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("movement_balance", e))?;
        balance_from_row(&row)
    }

    async fn save_item(&mut self, item: &Item) -> Result<(), StoreError> {
        self.ensure_same_item(item.id())?;
        let previous_version = self.item.as_ref().map(Item::version);
        let version = to_db_int(item.version(), "version")?;
        let tx = self.conn()?;

        match previous_version {
            Some(prev) => {
                let result = sqlx::query(
                    r#"
                    UPDATE items
                    SET price = $2, stock = $3, version = $4, updated_at = $5
                    WHERE id = $1 AND version = $6
                    "#,
                )
                .bind(item.id().as_uuid())
                .bind(item.price().as_decimal())
                .bind(item.stock())
                .bind(version)
                .bind(item.updated_at())
                .bind(to_db_int(prev, "version")?)
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("update_item", e))?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::Conflict(format!(
                        "item {} changed underneath the transaction",
                        item.id()
                    )));
                }
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO items (id, price, stock, version, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(item.id().as_uuid())
                .bind(item.price().as_decimal())
                .bind(item.stock())
                .bind(version)
                .bind(item.created_at())
                .bind(item.updated_at())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("insert_item", e))?;
            }
        }

        self.item = Some(item.clone());
        Ok(())
    }

    async fn append_price(&mut self, entry: NewPriceEntry) -> Result<PriceHistoryEntry, StoreError> {
        self.ensure_same_item(entry.item_id)?;
        let tx = self.conn()?;
        let row = sqlx::query(
            r#"
            INSERT INTO price_history (item_id, price, recorded_at)
            VALUES ($1, $2, $3)
            RETURNING sequence
            "#,
        )
        .bind(entry.item_id.as_uuid())
        .bind(entry.price.as_decimal())
        .bind(entry.recorded_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("append_price", e))?;

        let sequence = sequence_from_row(&row)?;
        Ok(entry.into_entry(sequence))
    }

    async fn append_movement(&mut self, entry: NewMovement) -> Result<StockMovementEntry, StoreError> {
        self.ensure_same_item(entry.item_id)?;
        let tx = self.conn()?;
        let row = sqlx::query(
            r#"
            INSERT INTO stock_movements (item_id, kind, quantity, reason, moved_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING sequence
            "#,
        )
        .bind(entry.item_id.as_uuid())
        .bind(entry.kind.as_str())
        .bind(entry.quantity)
        .bind(entry.reason.as_deref())
        .bind(entry.moved_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("append_movement", e))?;

        let sequence = sequence_from_row(&row)?;
        Ok(entry.into_entry(sequence))
    }

    async fn delete_item(&mut self) -> Result<bool, StoreError> {
        let item_id = self.item_id;
        let tx = self.conn()?;
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(item_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;

        self.item = None;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::Backend("transaction already committed".to_string()))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

fn to_db_int(value: u64, column: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Integrity(format!("{column} {value} out of range")))
}

fn from_db_int(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Integrity(format!("{column} {value} out of range")))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Backend(format!("failed to read column {name}: {e}")))
}

fn price_value(row: &PgRow) -> Result<Price, StoreError> {
    let raw: Decimal = column(row, "price")?;
    Price::new(raw).map_err(|e| StoreError::Integrity(format!("stored price {raw}: {e}")))
}

fn item_from_row(row: &PgRow) -> Result<Item, StoreError> {
    let id: uuid::Uuid = column(row, "id")?;
    let version: i64 = column(row, "version")?;
    let created_at: DateTime<Utc> = column(row, "created_at")?;
    let updated_at: DateTime<Utc> = column(row, "updated_at")?;
    Ok(Item::restore(
        ItemId::from_uuid(id),
        price_value(row)?,
        column(row, "stock")?,
        from_db_int(version, "version")?,
        created_at,
        updated_at,
    ))
}

fn price_from_row(row: &PgRow) -> Result<PriceHistoryEntry, StoreError> {
    let item_id: uuid::Uuid = column(row, "item_id")?;
    Ok(PriceHistoryEntry {
        sequence: sequence_from_row(row)?,
        item_id: ItemId::from_uuid(item_id),
        price: price_value(row)?,
        recorded_at: column(row, "recorded_at")?,
    })
}

fn movement_from_row(row: &PgRow) -> Result<StockMovementEntry, StoreError> {
    let item_id: uuid::Uuid = column(row, "item_id")?;
    let kind: String = column(row, "kind")?;
    let kind: MovementKind = kind
        .parse()
        .map_err(|e| StoreError::Integrity(format!("stored movement kind: {e}")))?;
    Ok(StockMovementEntry {
        sequence: sequence_from_row(row)?,
        item_id: ItemId::from_uuid(item_id),
        kind,
        quantity: column(row, "quantity")?,
        reason: column(row, "reason")?,
        moved_at: column(row, "moved_at")?,
    })
}

fn sequence_from_row(row: &PgRow) -> Result<u64, StoreError> {
    let sequence: i64 = column(row, "sequence")?;
    from_db_int(sequence, "sequence")
}

fn balance_from_row(row: &PgRow) -> Result<i64, StoreError> {
    column(row, "balance")
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("55P03") | Some("40001") | Some("40P01") | Some("23505") => {
                    tracing::warn!(operation, %msg, "item write conflict");
                    StoreError::Conflict(msg)
                }
                Some("23503") | Some("23514") => StoreError::Integrity(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        other => StoreError::Backend(format!("{} failed: {}", operation, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockrecon_core::ExpectedVersion;
    use stockrecon_ledger::{CreateItem, NegativeBalancePolicy, UpdateItem};

    use crate::catalog::{CatalogError, CatalogService};

    /// `None` when no database is configured; the tests below then pass vacuously.
    async fn store() -> Option<PostgresCatalogStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let store = PostgresCatalogStore::connect(&url)
            .await
            .unwrap()
            .with_lock_timeout(Duration::from_millis(100));
        store.migrate().await.unwrap();
        Some(store)
    }

    fn create(item_id: ItemId, price: &str, stock: i64) -> CreateItem {
        CreateItem {
            item_id,
            price: Price::parse(price).unwrap(),
            stock,
            occurred_at: Utc::now(),
        }
    }

    async fn ledger_rows(store: &PostgresCatalogStore, table: &str, item_id: ItemId) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table} WHERE item_id = $1"))
            .bind(item_id.as_uuid())
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn delete_cascades_to_ledger_tables() {
        let Some(store) = store().await else { return };
        let svc = CatalogService::new(store.clone(), NegativeBalancePolicy::Reject);
        let item_id = ItemId::new();

        svc.create_item(create(item_id, "10.00", 5)).await.unwrap();
        svc.update_item(UpdateItem {
            item_id,
            price: Price::parse("12.00").unwrap(),
            stock: 2,
            expected_version: ExpectedVersion::Exact(1),
            occurred_at: Utc::now(),
        })
        .await
        .unwrap();
        assert_eq!(svc.current_balance(item_id).await.unwrap(), 2);
        assert_eq!(ledger_rows(&store, "price_history", item_id).await, 2);
        assert_eq!(ledger_rows(&store, "stock_movements", item_id).await, 2);

        svc.delete_item(item_id).await.unwrap();

        assert!(matches!(svc.get_item(item_id).await, Err(CatalogError::NotFound)));
        assert_eq!(ledger_rows(&store, "price_history", item_id).await, 0);
        assert_eq!(ledger_rows(&store, "stock_movements", item_id).await, 0);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn row_lock_blocks_second_writer_until_released() {
        let Some(store) = store().await else { return };
        let svc = CatalogService::new(store.clone(), NegativeBalancePolicy::Reject);
        let item_id = ItemId::new();
        svc.create_item(create(item_id, "1.00", 1)).await.unwrap();

        let mut held = store.begin(item_id).await.unwrap();
        let err = store.begin(item_id).await.err().unwrap();
        assert!(matches!(err, StoreError::Conflict(_)));
        let err = svc.delete_item(item_id).await.unwrap_err();
        assert!(err.is_retryable());

        // Commit releases the row lock synchronously.
        held.commit().await.unwrap();
        let mut tx = store.begin(item_id).await.unwrap();
        assert_eq!(tx.movement_balance().await.unwrap(), 1);
        tx.commit().await.unwrap();

        svc.delete_item(item_id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn duplicate_create_is_rejected() {
        let Some(store) = store().await else { return };
        let svc = CatalogService::new(store, NegativeBalancePolicy::Reject);
        let item_id = ItemId::new();
        svc.create_item(create(item_id, "1.00", 0)).await.unwrap();

        let err = svc.create_item(create(item_id, "2.00", 0)).await.unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists(_)));
        svc.delete_item(item_id).await.unwrap();
    }
}
