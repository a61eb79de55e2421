use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use stockrecon_core::ItemId;
use stockrecon_ledger::{Item, NewMovement, NewPriceEntry, PriceHistoryEntry, StockMovementEntry};

use super::query::DateRange;

/// Storage operation error.
///
/// These are **infrastructure errors** (locking, constraints, backend IO) as
/// opposed to domain errors (validation, balance policy).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another unit of work holds or raced for the same item (lock timeout,
    /// serialization failure, duplicate key). Retryable.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error("item not found")]
    NotFound,

    /// A write would break referential or check constraints.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// One unit of work scoped to a single item.
///
/// Obtained from [`CatalogStore::begin`], which hands it out only once the
/// item's exclusive lock is held, so the read-aggregate-then-append sequence
/// of a reconciliation cannot interleave with another writer of the same item.
///
/// Reads observe the transaction's own uncommitted writes. Nothing becomes
/// visible to other readers until [`ItemTransaction::commit`] succeeds;
/// dropping the transaction discards every write.
#[async_trait]
pub trait ItemTransaction: Send {
    fn item_id(&self) -> ItemId;

    /// Current state of the item, `None` if it does not exist (yet).
    async fn item(&mut self) -> Result<Option<Item>, StoreError>;

    /// Most recent price snapshot by `(recorded_at, sequence)`.
    async fn latest_price(&mut self) -> Result<Option<PriceHistoryEntry>, StoreError>;

    /// Σ signed(kind, quantity) over every movement of the item.
    async fn movement_balance(&mut self) -> Result<i64, StoreError>;

    /// Insert or replace the item state.
    async fn save_item(&mut self, item: &Item) -> Result<(), StoreError>;

    async fn append_price(&mut self, entry: NewPriceEntry) -> Result<PriceHistoryEntry, StoreError>;

    async fn append_movement(&mut self, entry: NewMovement) -> Result<StockMovementEntry, StoreError>;

    /// Delete the item together with both of its ledgers. Returns whether it existed.
    async fn delete_item(&mut self) -> Result<bool, StoreError>;

    /// Make every write of this unit of work visible atomically.
    async fn commit(&mut self) -> Result<(), StoreError>;
}

/// Item state plus its price and stock ledgers.
///
/// Writes go exclusively through [`ItemTransaction`]s; the read methods
/// observe committed data only and always return newest entries first.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Open a unit of work on `item_id`, waiting for its exclusive lock.
    ///
    /// Implementations bound the wait and fail with [`StoreError::Conflict`]
    /// when it expires.
    async fn begin(&self, item_id: ItemId) -> Result<Box<dyn ItemTransaction>, StoreError>;

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError>;

    async fn price_history(
        &self,
        item_id: ItemId,
        range: DateRange,
    ) -> Result<Vec<PriceHistoryEntry>, StoreError>;

    async fn stock_movements(&self, item_id: ItemId) -> Result<Vec<StockMovementEntry>, StoreError>;

    /// Committed ledger balance; zero for unknown items.
    async fn movement_balance(&self, item_id: ItemId) -> Result<i64, StoreError>;

    /// Newest price snapshot of every item, newest first.
    async fn latest_prices(&self) -> Result<Vec<PriceHistoryEntry>, StoreError>;
}

#[async_trait]
impl<S> CatalogStore for Arc<S>
where
    S: CatalogStore + ?Sized,
{
    async fn begin(&self, item_id: ItemId) -> Result<Box<dyn ItemTransaction>, StoreError> {
        (**self).begin(item_id).await
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).get_item(item_id).await
    }

    async fn price_history(
        &self,
        item_id: ItemId,
        range: DateRange,
    ) -> Result<Vec<PriceHistoryEntry>, StoreError> {
        (**self).price_history(item_id, range).await
    }

    async fn stock_movements(&self, item_id: ItemId) -> Result<Vec<StockMovementEntry>, StoreError> {
        (**self).stock_movements(item_id).await
    }

    async fn movement_balance(&self, item_id: ItemId) -> Result<i64, StoreError> {
        (**self).movement_balance(item_id).await
    }

    async fn latest_prices(&self) -> Result<Vec<PriceHistoryEntry>, StoreError> {
        (**self).latest_prices().await
    }
}
