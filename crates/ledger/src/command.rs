//! Write commands accepted at the catalog boundary.
//!
//! Every command carries the timestamp it takes effect at; ledger entries
//! written on its behalf are stamped with the same instant.

use chrono::{DateTime, Utc};

use stockrecon_core::{DomainError, DomainResult, ExpectedVersion, ItemId};

use crate::price::Price;
use crate::stock_movement::MovementKind;

/// Command: CreateItem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateItem {
    pub item_id: ItemId,
    pub price: Price,
    pub stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateItem (absolute new price and stock).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateItem {
    pub item_id: ItemId,
    pub price: Price,
    pub stock: i64,
    pub expected_version: ExpectedVersion,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordMovement (signed stock change, the delta-based write path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMovement {
    pub item_id: ItemId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub reason: Option<String>,
    pub expected_version: ExpectedVersion,
    pub occurred_at: DateTime<Utc>,
}

fn ensure_stock(stock: i64) -> DomainResult<()> {
    if stock < 0 {
        return Err(DomainError::validation("stock cannot be negative"));
    }
    Ok(())
}

impl CreateItem {
    pub fn validate(&self) -> DomainResult<()> {
        ensure_stock(self.stock)
    }
}

impl UpdateItem {
    pub fn validate(&self) -> DomainResult<()> {
        ensure_stock(self.stock)
    }
}

impl RecordMovement {
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        Ok(())
    }

    /// Trimmed reason; blank reasons are dropped.
    pub fn normalized_reason(&self) -> Option<String> {
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
    }
}
