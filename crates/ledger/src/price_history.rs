//! Price ledger: one snapshot per distinct consecutive price.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockrecon_core::ItemId;

use crate::price::Price;

/// One committed price snapshot (append-only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    /// Store-assigned, monotonically increasing; breaks timestamp ties.
    pub sequence: u64,
    pub item_id: ItemId,
    pub price: Price,
    pub recorded_at: DateTime<Utc>,
}

impl PriceHistoryEntry {
    pub fn ordering_key(&self) -> (DateTime<Utc>, u64) {
        (self.recorded_at, self.sequence)
    }
}

/// A price snapshot ready to be appended (not yet assigned a sequence number).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPriceEntry {
    pub item_id: ItemId,
    pub price: Price,
    pub recorded_at: DateTime<Utc>,
}

impl NewPriceEntry {
    pub fn into_entry(self, sequence: u64) -> PriceHistoryEntry {
        PriceHistoryEntry {
            sequence,
            item_id: self.item_id,
            price: self.price,
            recorded_at: self.recorded_at,
        }
    }
}

/// Whether `new_price` must be appended to the price ledger.
///
/// Creation always records the initial price. Otherwise a snapshot is written
/// only when there is no prior entry or the newest one differs, so re-saving
/// an unchanged price never grows the ledger.
pub fn price_changed(latest: Option<&Price>, new_price: &Price, is_creation: bool) -> bool {
    if is_creation {
        return true;
    }
    latest != Some(new_price)
}

/// Sort snapshots newest first: `recorded_at` descending, then `sequence` descending.
pub fn sort_prices_newest_first(entries: &mut [PriceHistoryEntry]) {
    entries.sort_by(|a, b| b.ordering_key().cmp(&a.ordering_key()));
}
