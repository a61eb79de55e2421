//! Keeps an item's price and stock ledgers in step with its current state.
//!
//! The [`Reconciler`] runs inside the writer's [`ItemTransaction`], after the
//! new item state has been saved and before commit. Every ledger read it does
//! therefore sees the same snapshot as the write it is paired with, and any
//! error it returns leaves the transaction uncommitted (the caller drops it,
//! which rolls back the state write together with any ledger append).

use chrono::{DateTime, Utc};
use tracing::instrument;

use stockrecon_core::{DomainError, ItemId};
use stockrecon_ledger::{
    Item, NegativeBalancePolicy, NewPriceEntry, Price, PriceHistoryEntry, StockMovementEntry,
    plan_stock_adjustment, price_changed,
};

use crate::catalog::CatalogError;
use crate::store::{ItemTransaction, StoreError};

/// Ledger entries appended by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub price_entry: Option<PriceHistoryEntry>,
    pub movement: Option<StockMovementEntry>,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.price_entry.is_none() && self.movement.is_none()
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct Reconciler {
    policy: NegativeBalancePolicy,
}

impl Reconciler {
    pub fn new(policy: NegativeBalancePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> NegativeBalancePolicy {
        self.policy
    }

    /// Append a price snapshot unless the newest one already carries `new_price`.
    ///
    /// On creation there is nothing to compare against, so the ledger is not
    /// read at all.
    pub async fn append_price_if_changed(
        &self,
        tx: &mut dyn ItemTransaction,
        item_id: ItemId,
        new_price: Price,
        is_creation: bool,
        at: DateTime<Utc>,
    ) -> Result<Option<PriceHistoryEntry>, CatalogError> {
        ensure_transaction_item(tx, item_id)?;

        let latest = if is_creation {
            None
        } else {
            tx.latest_price().await?
        };

        if !price_changed(latest.as_ref().map(|e| &e.price), &new_price, is_creation) {
            return Ok(None);
        }

        let entry = tx
            .append_price(NewPriceEntry {
                item_id,
                price: new_price,
                recorded_at: at,
            })
            .await?;
        tracing::debug!(
            item_id = %item_id,
            price = %entry.price,
            sequence = entry.sequence,
            "price history entry appended"
        );
        Ok(Some(entry))
    }

    /// Append the movement that brings the ledger balance to `declared`.
    pub async fn reconcile_stock(
        &self,
        tx: &mut dyn ItemTransaction,
        item_id: ItemId,
        declared: i64,
        is_creation: bool,
        at: DateTime<Utc>,
    ) -> Result<Option<StockMovementEntry>, CatalogError> {
        ensure_transaction_item(tx, item_id)?;

        let current_sum = if is_creation {
            0
        } else {
            tx.movement_balance().await?
        };

        let planned =
            plan_stock_adjustment(item_id, current_sum, declared, is_creation, self.policy)?;

        if declared < 0 {
            tracing::warn!(
                item_id = %item_id,
                balance = declared,
                "stock ledger balance is negative (backorder)"
            );
        }

        let Some(adjustment) = planned else {
            return Ok(None);
        };

        let entry = tx
            .append_movement(adjustment.into_movement(item_id, at))
            .await?;
        tracing::debug!(
            item_id = %item_id,
            kind = %entry.kind,
            quantity = entry.quantity,
            current_sum,
            declared,
            "stock movement appended"
        );
        Ok(Some(entry))
    }

    /// Reconcile both ledgers against a freshly saved item state.
    ///
    /// `previous` is `None` for a creation. Fails with
    /// [`CatalogError::Consistency`] when the stock ledger does not sum to
    /// `current.stock` afterwards.
    #[instrument(
        skip(self, tx, previous, current),
        fields(item_id = %current.id(), version = current.version()),
        err
    )]
    pub async fn on_item_committed(
        &self,
        tx: &mut dyn ItemTransaction,
        previous: Option<&Item>,
        current: &Item,
    ) -> Result<ReconcileOutcome, CatalogError> {
        let is_creation = previous.is_none();
        let at = current.updated_at();

        let price_entry = self
            .append_price_if_changed(tx, current.id(), current.price(), is_creation, at)
            .await?;
        let movement = self
            .reconcile_stock(tx, current.id(), current.stock(), is_creation, at)
            .await?;

        let balance = tx.movement_balance().await?;
        if balance != current.stock() {
            return Err(DomainError::consistency(format!(
                "stock ledger of item {} sums to {balance}, item declares {}",
                current.id(),
                current.stock()
            ))
            .into());
        }

        Ok(ReconcileOutcome {
            price_entry,
            movement,
        })
    }
}

fn ensure_transaction_item(tx: &dyn ItemTransaction, item_id: ItemId) -> Result<(), StoreError> {
    if tx.item_id() != item_id {
        return Err(StoreError::Integrity(format!(
            "transaction on item {} cannot reconcile item {item_id}",
            tx.item_id()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CatalogStore, DateRange, InMemoryCatalogStore};
    use chrono::Duration;
    use stockrecon_ledger::{
        ADJUSTMENT_REASON, CreateItem, INITIAL_STOCK_REASON, MovementKind, NewMovement, UpdateItem,
    };
    use stockrecon_core::ExpectedVersion;

    fn price(s: &str) -> Price {
        Price::parse(s).unwrap()
    }

    fn new_item(stock: i64) -> Item {
        Item::create(&CreateItem {
            item_id: ItemId::new(),
            price: price("100.00"),
            stock,
            occurred_at: Utc::now(),
        })
        .unwrap()
    }

    fn next(item: &Item, p: &str, stock: i64) -> Item {
        item.updated(&UpdateItem {
            item_id: item.id(),
            price: price(p),
            stock,
            expected_version: ExpectedVersion::Any,
            occurred_at: item.updated_at() + Duration::seconds(1),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn creation_writes_initial_entries() {
        let store = InMemoryCatalogStore::new();
        let item = new_item(5);
        let mut tx = store.begin(item.id()).await.unwrap();
        tx.save_item(&item).await.unwrap();

        let outcome = Reconciler::default()
            .on_item_committed(tx.as_mut(), None, &item)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let price_entry = outcome.price_entry.unwrap();
        assert_eq!(price_entry.price, price("100.00"));
        let movement = outcome.movement.unwrap();
        assert_eq!(movement.kind, MovementKind::In);
        assert_eq!(movement.quantity, 5);
        assert_eq!(movement.reason.as_deref(), Some(INITIAL_STOCK_REASON));
    }

    #[tokio::test]
    async fn unchanged_state_appends_nothing() {
        let store = InMemoryCatalogStore::new();
        let item = new_item(5);
        let mut tx = store.begin(item.id()).await.unwrap();
        tx.save_item(&item).await.unwrap();
        let reconciler = Reconciler::default();
        reconciler.on_item_committed(tx.as_mut(), None, &item).await.unwrap();

        let same = next(&item, "100.00", 5);
        tx.save_item(&same).await.unwrap();
        let outcome = reconciler
            .on_item_committed(tx.as_mut(), Some(&item), &same)
            .await
            .unwrap();
        assert!(outcome.is_noop());
    }

    #[tokio::test]
    async fn stock_decrease_appends_out_adjustment() {
        let store = InMemoryCatalogStore::new();
        let item = new_item(8);
        let mut tx = store.begin(item.id()).await.unwrap();
        tx.save_item(&item).await.unwrap();
        let reconciler = Reconciler::default();
        reconciler.on_item_committed(tx.as_mut(), None, &item).await.unwrap();

        let lower = next(&item, "100.00", 3);
        tx.save_item(&lower).await.unwrap();
        let outcome = reconciler
            .on_item_committed(tx.as_mut(), Some(&item), &lower)
            .await
            .unwrap();

        assert!(outcome.price_entry.is_none());
        let movement = outcome.movement.unwrap();
        assert_eq!(movement.kind, MovementKind::Out);
        assert_eq!(movement.quantity, 5);
        assert_eq!(movement.reason.as_deref(), Some(ADJUSTMENT_REASON));
        assert_eq!(tx.movement_balance().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn drifted_ledger_is_brought_back_to_declared_stock() {
        let store = InMemoryCatalogStore::new();
        let item = new_item(5);
        let mut tx = store.begin(item.id()).await.unwrap();
        tx.save_item(&item).await.unwrap();
        let reconciler = Reconciler::default();
        reconciler.on_item_committed(tx.as_mut(), None, &item).await.unwrap();

        tx.append_movement(NewMovement {
            item_id: item.id(),
            kind: MovementKind::In,
            quantity: 2,
            reason: None,
            moved_at: Utc::now(),
        })
        .await
        .unwrap();

        let same = next(&item, "100.00", 5);
        tx.save_item(&same).await.unwrap();
        let outcome = reconciler
            .on_item_committed(tx.as_mut(), Some(&item), &same)
            .await
            .unwrap();
        let movement = outcome.movement.unwrap();
        assert_eq!(movement.kind, MovementKind::Out);
        assert_eq!(movement.quantity, 2);
    }

    #[tokio::test]
    async fn reject_policy_fails_negative_stock() {
        let store = InMemoryCatalogStore::new();
        let item = new_item(0);
        let mut tx = store.begin(item.id()).await.unwrap();
        tx.save_item(&item).await.unwrap();

        let err = Reconciler::default()
            .reconcile_stock(tx.as_mut(), item.id(), -2, false, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Consistency(_)));
        assert_eq!(tx.movement_balance().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn backorder_policy_permits_negative_stock() {
        let store = InMemoryCatalogStore::new();
        let item = new_item(0);
        let mut tx = store.begin(item.id()).await.unwrap();
        tx.save_item(&item).await.unwrap();

        let movement = Reconciler::new(NegativeBalancePolicy::AllowBackorder)
            .reconcile_stock(tx.as_mut(), item.id(), -2, false, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(movement.kind, MovementKind::Out);
        assert_eq!(tx.movement_balance().await.unwrap(), -2);
    }

    #[tokio::test]
    async fn failed_stock_step_discards_price_entry() {
        let store = InMemoryCatalogStore::new();
        let item = Item::create(&CreateItem {
            item_id: ItemId::new(),
            price: price("1.00"),
            stock: 1,
            occurred_at: Utc::now(),
        })
        .unwrap();
        let reconciler = Reconciler::new(NegativeBalancePolicy::Reject);
        {
            let mut tx = store.begin(item.id()).await.unwrap();
            tx.save_item(&item).await.unwrap();
            reconciler.on_item_committed(tx.as_mut(), None, &item).await.unwrap();
            tx.commit().await.unwrap();
        }

        // A state that passed no command validation: new price, stock below zero.
        let broken = Item::restore(
            item.id(),
            price("2.00"),
            -2,
            item.version() + 1,
            item.created_at(),
            item.updated_at() + Duration::seconds(1),
        );
        {
            let mut tx = store.begin(item.id()).await.unwrap();
            tx.save_item(&broken).await.unwrap();
            let err = reconciler
                .on_item_committed(tx.as_mut(), Some(&item), &broken)
                .await
                .unwrap_err();
            assert!(matches!(err, CatalogError::Consistency(_)));
            // The price step already ran inside this transaction.
            assert_eq!(tx.latest_price().await.unwrap().unwrap().price, price("2.00"));
        }

        let prices = store.price_history(item.id(), DateRange::all()).await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].price, price("1.00"));
        assert_eq!(store.movement_balance(item.id()).await.unwrap(), 1);
        assert_eq!(store.get_item(item.id()).await.unwrap(), Some(item));
    }

    #[tokio::test]
    async fn backorder_balance_left_as_is_appends_nothing() {
        let store = InMemoryCatalogStore::new();
        let item = new_item(0);
        let mut tx = store.begin(item.id()).await.unwrap();
        tx.save_item(&item).await.unwrap();
        let reconciler = Reconciler::new(NegativeBalancePolicy::AllowBackorder);
        reconciler
            .reconcile_stock(tx.as_mut(), item.id(), -2, false, Utc::now())
            .await
            .unwrap();

        let again = reconciler
            .reconcile_stock(tx.as_mut(), item.id(), -2, false, Utc::now())
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(tx.movement_balance().await.unwrap(), -2);
    }

    #[tokio::test]
    async fn refuses_foreign_item() {
        let store = InMemoryCatalogStore::new();
        let item = new_item(1);
        let mut tx = store.begin(item.id()).await.unwrap();

        let err = Reconciler::default()
            .append_price_if_changed(tx.as_mut(), ItemId::new(), price("1.00"), true, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Store(StoreError::Integrity(_))));
    }
}
