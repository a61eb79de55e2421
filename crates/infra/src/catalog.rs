//! Catalog write path and read APIs.
//!
//! Every state change of an item goes through [`CatalogService`], which runs
//! the reconciliation explicitly inside the same unit of work as the state
//! write:
//!
//! ```text
//! Command
//!   ↓
//! 1. Validate (pure, before any lock is taken)
//!   ↓
//! 2. Begin a transaction holding the item's exclusive lock
//!   ↓
//! 3. Load the previous state, build the new one (version check)
//!   ↓
//! 4. Save the new state
//!   ↓
//! 5. Reconcile price and stock ledgers against it
//!   ↓
//! 6. Commit (state and ledger entries become visible together)
//! ```
//!
//! Any error before step 6 drops the transaction, which discards the state
//! write and every ledger append.

use thiserror::Error;
use tracing::instrument;

use stockrecon_core::{DomainError, ItemId};
use stockrecon_ledger::{
    CreateItem, Item, NegativeBalancePolicy, NewMovement, PriceHistoryEntry, RecordMovement,
    StockMovementEntry, UpdateItem,
};

use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::store::{CatalogStore, DateRange, StoreError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("consistency violation: {0}")]
    Consistency(String),

    /// Lost the race for an item (lock timeout, stale expected version). Retryable.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Create of an id that is already taken. Retrying cannot succeed.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("item not found")]
    NotFound,

    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error(transparent)]
    Store(StoreError),
}

impl CatalogError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::Conflict(_))
    }
}

impl From<DomainError> for CatalogError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => CatalogError::Validation(msg),
            DomainError::Consistency(msg) => CatalogError::Consistency(msg),
            DomainError::Conflict(msg) => CatalogError::Conflict(msg),
            DomainError::InvalidId(msg) => CatalogError::InvalidId(msg),
            DomainError::NotFound => CatalogError::NotFound,
        }
    }
}

impl From<StoreError> for CatalogError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => CatalogError::Conflict(msg),
            StoreError::NotFound => CatalogError::NotFound,
            other => CatalogError::Store(other),
        }
    }
}

/// Item state after a committed write, plus the ledger entries it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedItem {
    pub item: Item,
    pub outcome: ReconcileOutcome,
}

/// Result of [`CatalogService::record_movement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMovement {
    pub item: Item,
    pub movement: StockMovementEntry,
    /// Correcting entries, only present if the ledger had drifted before the move.
    pub outcome: ReconcileOutcome,
}

#[derive(Debug, Clone)]
pub struct CatalogService<S> {
    store: S,
    reconciler: Reconciler,
}

impl<S> CatalogService<S>
where
    S: CatalogStore,
{
    pub fn new(store: S, policy: NegativeBalancePolicy) -> Self {
        Self {
            store,
            reconciler: Reconciler::new(policy),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> NegativeBalancePolicy {
        self.reconciler.policy()
    }

    #[instrument(skip(self, cmd), fields(item_id = %cmd.item_id, stock = cmd.stock), err)]
    pub async fn create_item(&self, cmd: CreateItem) -> Result<CommittedItem, CatalogError> {
        let item = Item::create(&cmd)?;

        let mut tx = self.store.begin(cmd.item_id).await?;
        if tx.item().await?.is_some() {
            return Err(CatalogError::AlreadyExists(format!(
                "item {}",
                cmd.item_id
            )));
        }

        tx.save_item(&item).await?;
        let outcome = self
            .reconciler
            .on_item_committed(tx.as_mut(), None, &item)
            .await?;
        tx.commit().await?;

        tracing::info!(version = item.version(), "item created");
        Ok(CommittedItem { item, outcome })
    }

    #[instrument(
        skip(self, cmd),
        fields(item_id = %cmd.item_id, stock = cmd.stock, expected_version = ?cmd.expected_version),
        err
    )]
    pub async fn update_item(&self, cmd: UpdateItem) -> Result<CommittedItem, CatalogError> {
        cmd.validate()?;

        let mut tx = self.store.begin(cmd.item_id).await?;
        let previous = tx.item().await?.ok_or(CatalogError::NotFound)?;
        let item = previous.updated(&cmd)?;

        tx.save_item(&item).await?;
        let outcome = self
            .reconciler
            .on_item_committed(tx.as_mut(), Some(&previous), &item)
            .await?;
        tx.commit().await?;

        tracing::info!(
            version = item.version(),
            price_appended = outcome.price_entry.is_some(),
            movement_appended = outcome.movement.is_some(),
            "item updated"
        );
        Ok(CommittedItem { item, outcome })
    }

    /// Move stock by a signed quantity instead of declaring an absolute value.
    ///
    /// The movement is appended as given (with the caller's reason) in the
    /// same unit of work as the stock change, so the reconciliation pass that
    /// follows finds nothing to correct on a consistent ledger.
    #[instrument(
        skip(self, cmd),
        fields(item_id = %cmd.item_id, kind = %cmd.kind, quantity = cmd.quantity),
        err
    )]
    pub async fn record_movement(&self, cmd: RecordMovement) -> Result<RecordedMovement, CatalogError> {
        cmd.validate()?;

        let mut tx = self.store.begin(cmd.item_id).await?;
        let previous = tx.item().await?.ok_or(CatalogError::NotFound)?;
        let item = previous.moved(&cmd, self.reconciler.policy())?;

        tx.save_item(&item).await?;
        let movement = tx
            .append_movement(NewMovement {
                item_id: cmd.item_id,
                kind: cmd.kind,
                quantity: cmd.quantity,
                reason: cmd.normalized_reason(),
                moved_at: item.updated_at(),
            })
            .await?;
        let outcome = self
            .reconciler
            .on_item_committed(tx.as_mut(), Some(&previous), &item)
            .await?;
        tx.commit().await?;

        if outcome.movement.is_some() {
            tracing::warn!("stock ledger had drifted; correcting movement appended");
        }
        tracing::info!(version = item.version(), stock = item.stock(), "stock movement recorded");
        Ok(RecordedMovement {
            item,
            movement,
            outcome,
        })
    }

    /// Delete an item together with both ledgers.
    #[instrument(skip(self), fields(item_id = %item_id), err)]
    pub async fn delete_item(&self, item_id: ItemId) -> Result<(), CatalogError> {
        let mut tx = self.store.begin(item_id).await?;
        if !tx.delete_item().await? {
            return Err(CatalogError::NotFound);
        }
        tx.commit().await?;

        tracing::info!("item deleted");
        Ok(())
    }

    pub async fn get_item(&self, item_id: ItemId) -> Result<Item, CatalogError> {
        self.store
            .get_item(item_id)
            .await?
            .ok_or(CatalogError::NotFound)
    }

    /// Price snapshots of an item, newest first. Empty for unknown items.
    pub async fn price_history(
        &self,
        item_id: ItemId,
        range: DateRange,
    ) -> Result<Vec<PriceHistoryEntry>, CatalogError> {
        Ok(self.store.price_history(item_id, range).await?)
    }

    /// Stock movements of an item, newest first. Empty for unknown items.
    pub async fn stock_movements(&self, item_id: ItemId) -> Result<Vec<StockMovementEntry>, CatalogError> {
        Ok(self.store.stock_movements(item_id).await?)
    }

    /// Signed sum of the item's stock ledger.
    pub async fn current_balance(&self, item_id: ItemId) -> Result<i64, CatalogError> {
        if self.store.get_item(item_id).await?.is_none() {
            return Err(CatalogError::NotFound);
        }
        Ok(self.store.movement_balance(item_id).await?)
    }

    /// Newest price of every item, newest first.
    pub async fn latest_prices(&self) -> Result<Vec<PriceHistoryEntry>, CatalogError> {
        Ok(self.store.latest_prices().await?)
    }
}
