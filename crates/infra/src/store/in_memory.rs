use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as ItemLock, OwnedMutexGuard};

use stockrecon_core::ItemId;
use stockrecon_ledger::{
    Item, NewMovement, NewPriceEntry, PriceHistoryEntry, StockMovementEntry, signed_balance,
    sort_movements_newest_first, sort_prices_newest_first,
};

use super::query::DateRange;
use super::r#trait::{CatalogStore, ItemTransaction, StoreError};

/// Default bound on how long `begin` waits for an item's lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// An item and both of its ledgers; the unit that commits atomically.
#[derive(Debug, Clone)]
struct ItemRecord {
    item: Item,
    prices: Vec<PriceHistoryEntry>,
    movements: Vec<StockMovementEntry>,
}

impl ItemRecord {
    fn latest_price(&self) -> Option<&PriceHistoryEntry> {
        self.prices.iter().max_by_key(|e| e.ordering_key())
    }
}

#[derive(Debug, Default)]
struct Shared {
    records: RwLock<HashMap<ItemId, ItemRecord>>,
    locks: Mutex<HashMap<ItemId, Arc<ItemLock<()>>>>,
    sequence: AtomicU64,
}

impl Shared {
    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

/// In-memory item store with per-item exclusive locks.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Clone)]
pub struct InMemoryCatalogStore {
    shared: Arc<Shared>,
    lock_timeout: Duration,
}

impl Default for InMemoryCatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            lock_timeout,
        }
    }

    fn item_lock(&self, item_id: ItemId) -> Result<Arc<ItemLock<()>>, StoreError> {
        let mut locks = self.shared.locks.lock().map_err(|_| poisoned())?;
        Ok(locks.entry(item_id).or_default().clone())
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn begin(&self, item_id: ItemId) -> Result<Box<dyn ItemTransaction>, StoreError> {
        let lock = self.item_lock(item_id)?;
        let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(%item_id, timeout = ?self.lock_timeout, "item lock wait timed out");
                StoreError::Conflict(format!(
                    "timed out after {:?} waiting for the lock on item {item_id}",
                    self.lock_timeout
                ))
            })?;

        // Snapshot taken under the item lock: no other writer can change it
        // until this transaction is dropped.
        let working = {
            let records = self.shared.records.read().map_err(|_| poisoned())?;
            records.get(&item_id).cloned()
        };

        Ok(Box::new(InMemoryTransaction {
            shared: self.shared.clone(),
            item_id,
            guard,
            working,
            deleted: false,
            finished: false,
        }))
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        let records = self.shared.records.read().map_err(|_| poisoned())?;
        Ok(records.get(&item_id).map(|r| r.item.clone()))
    }

    async fn price_history(
        &self,
        item_id: ItemId,
        range: DateRange,
    ) -> Result<Vec<PriceHistoryEntry>, StoreError> {
        let records = self.shared.records.read().map_err(|_| poisoned())?;
        let mut entries: Vec<_> = records
            .get(&item_id)
            .map(|r| {
                r.prices
                    .iter()
                    .filter(|e| range.contains(e.recorded_at))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sort_prices_newest_first(&mut entries);
        Ok(entries)
    }

    async fn stock_movements(&self, item_id: ItemId) -> Result<Vec<StockMovementEntry>, StoreError> {
        let records = self.shared.records.read().map_err(|_| poisoned())?;
        let mut entries = records
            .get(&item_id)
            .map(|r| r.movements.clone())
            .unwrap_or_default();
        sort_movements_newest_first(&mut entries);
        Ok(entries)
    }

    async fn movement_balance(&self, item_id: ItemId) -> Result<i64, StoreError> {
        let records = self.shared.records.read().map_err(|_| poisoned())?;
        Ok(records
            .get(&item_id)
            .map(|r| signed_balance(&r.movements))
            .unwrap_or(0))
    }

    async fn latest_prices(&self) -> Result<Vec<PriceHistoryEntry>, StoreError> {
        let records = self.shared.records.read().map_err(|_| poisoned())?;
        let mut latest: Vec<_> = records
            .values()
            .filter_map(|r| r.latest_price().cloned())
            .collect();
        sort_prices_newest_first(&mut latest);
        Ok(latest)
    }
}

/// Unit of work over a private copy of one item record.
///
/// Holds the item's lock for its whole lifetime; `commit` swaps the copy into
/// the shared map in one step.
struct InMemoryTransaction {
    shared: Arc<Shared>,
    item_id: ItemId,
    guard: OwnedMutexGuard<()>,
    working: Option<ItemRecord>,
    deleted: bool,
    finished: bool,
}

impl InMemoryTransaction {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Backend("transaction already committed".to_string()));
        }
        Ok(())
    }

    fn record_mut(&mut self, what: &str) -> Result<&mut ItemRecord, StoreError> {
        self.ensure_open()?;
        let item_id = self.item_id;
        self.working.as_mut().ok_or_else(|| {
            StoreError::Integrity(format!("{what} references missing item {item_id}"))
        })
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

impl Drop for InMemoryTransaction {
    /// Evict the item's lock once no other writer holds or awaits it.
    ///
    /// Waiters clone the `Arc` under the `locks` mutex, so a count of two (the
    /// table and this guard) cannot grow while it is held.
    fn drop(&mut self) {
        let Ok(mut locks) = self.shared.locks.lock() else {
            return;
        };
        let held = OwnedMutexGuard::mutex(&self.guard);
        let idle = locks
            .get(&self.item_id)
            .is_some_and(|lock| Arc::ptr_eq(lock, held) && Arc::strong_count(lock) == 2);
        if idle {
            locks.remove(&self.item_id);
        }
    }
}

#[async_trait]
impl ItemTransaction for InMemoryTransaction {
    fn item_id(&self) -> ItemId {
        self.item_id
    }

    async fn item(&mut self) -> Result<Option<Item>, StoreError> {
        self.ensure_open()?;
        Ok(self.working.as_ref().map(|r| r.item.clone()))
    }

    async fn latest_price(&mut self) -> Result<Option<PriceHistoryEntry>, StoreError> {
        self.ensure_open()?;
        Ok(self
            .working
            .as_ref()
            .and_then(|r| r.latest_price().cloned()))
    }

    async fn movement_balance(&mut self) -> Result<i64, StoreError> {
        self.ensure_open()?;
        Ok(self
            .working
            .as_ref()
            .map(|r| signed_balance(&r.movements))
            .unwrap_or(0))
    }

    async fn save_item(&mut self, item: &Item) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.ensure_same_item(item.id())?;
        match self.working.as_mut() {
            Some(record) => record.item = item.clone(),
            None => {
                self.working = Some(ItemRecord {
                    item: item.clone(),
                    prices: Vec::new(),
                    movements: Vec::new(),
                })
            }
        }
        self.deleted = false;
        Ok(())
    }

    async fn append_price(&mut self, entry: NewPriceEntry) -> Result<PriceHistoryEntry, StoreError> {
        self.ensure_same_item(entry.item_id)?;
        let shared = self.shared.clone();
        let record = self.record_mut("price entry")?;
        let stored = entry.into_entry(shared.next_sequence());
        record.prices.push(stored.clone());
        Ok(stored)
    }

    async fn append_movement(&mut self, entry: NewMovement) -> Result<StockMovementEntry, StoreError> {
        self.ensure_same_item(entry.item_id)?;
        if entry.quantity <= 0 {
            return Err(StoreError::Integrity(format!(
                "movement quantity must be positive, got {}",
                entry.quantity
            )));
        }
        let shared = self.shared.clone();
        let record = self.record_mut("stock movement")?;
        let stored = entry.into_entry(shared.next_sequence());
        record.movements.push(stored.clone());
        Ok(stored)
    }

    async fn delete_item(&mut self) -> Result<bool, StoreError> {
        self.ensure_open()?;
        let existed = self.working.take().is_some();
        self.deleted = true;
        Ok(existed)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut records = self.shared.records.write().map_err(|_| poisoned())?;
        match self.working.take() {
            Some(record) => {
                records.insert(self.item_id, record);
            }
            None if self.deleted => {
                records.remove(&self.item_id);
            }
            None => {}
        }
        self.finished = true;
        Ok(())
    }
}
