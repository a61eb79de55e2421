//! Stock ledger: signed quantity movements and the reconciliation rule that
//! keeps their sum equal to the item's declared stock.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockrecon_core::{DomainError, DomainResult, ItemId};

/// Reason attached to the movement written when an item is created.
pub const INITIAL_STOCK_REASON: &str = "initial stock registration";

/// Reason attached to movements written to absorb a declared stock change.
pub const ADJUSTMENT_REASON: &str = "adjustment";

/// Direction of a stock movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

impl MovementKind {
    /// Signed contribution of `quantity` to the ledger balance.
    pub fn signed(self, quantity: i64) -> i64 {
        match self {
            MovementKind::In => quantity,
            MovementKind::Out => -quantity,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::In => "IN",
            MovementKind::Out => "OUT",
        }
    }
}

impl FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" => Ok(MovementKind::In),
            "OUT" => Ok(MovementKind::Out),
            other => Err(DomainError::validation(format!(
                "movement kind must be IN or OUT, got '{other}'"
            ))),
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed stock movement (append-only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovementEntry {
    /// Store-assigned, monotonically increasing; breaks timestamp ties.
    pub sequence: u64,
    pub item_id: ItemId,
    pub kind: MovementKind,
    /// Always positive; the direction lives in `kind`.
    pub quantity: i64,
    pub reason: Option<String>,
    pub moved_at: DateTime<Utc>,
}

impl StockMovementEntry {
    pub fn signed_quantity(&self) -> i64 {
        self.kind.signed(self.quantity)
    }

    pub fn ordering_key(&self) -> (DateTime<Utc>, u64) {
        (self.moved_at, self.sequence)
    }
}

/// A movement ready to be appended (not yet assigned a sequence number).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub item_id: ItemId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub reason: Option<String>,
    pub moved_at: DateTime<Utc>,
}

impl NewMovement {
    pub fn into_entry(self, sequence: u64) -> StockMovementEntry {
        StockMovementEntry {
            sequence,
            item_id: self.item_id,
            kind: self.kind,
            quantity: self.quantity,
            reason: self.reason,
            moved_at: self.moved_at,
        }
    }
}

/// Σ signed(kind, quantity) over a set of movements.
pub fn signed_balance<'a>(movements: impl IntoIterator<Item = &'a StockMovementEntry>) -> i64 {
    movements.into_iter().map(StockMovementEntry::signed_quantity).sum()
}

/// Sort movements newest first: `moved_at` descending, then `sequence` descending.
pub fn sort_movements_newest_first(movements: &mut [StockMovementEntry]) {
    movements.sort_by(|a, b| b.ordering_key().cmp(&a.ordering_key()));
}

/// What to do when the stock ledger balance would drop below zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegativeBalancePolicy {
    /// Fail the whole write with [`DomainError::Consistency`].
    #[default]
    Reject,
    /// Accept the negative balance as a backorder.
    #[serde(rename = "backorder")]
    AllowBackorder,
}

impl NegativeBalancePolicy {
    /// Check the balance the ledger would hold once the write is applied.
    pub fn check(self, item_id: ItemId, resulting_balance: i64) -> DomainResult<()> {
        if resulting_balance >= 0 {
            return Ok(());
        }
        match self {
            NegativeBalancePolicy::Reject => Err(DomainError::consistency(format!(
                "stock ledger of item {item_id} would fall to {resulting_balance}"
            ))),
            NegativeBalancePolicy::AllowBackorder => Ok(()),
        }
    }
}

impl FromStr for NegativeBalancePolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(NegativeBalancePolicy::Reject),
            "backorder" | "allow_backorder" => Ok(NegativeBalancePolicy::AllowBackorder),
            other => Err(DomainError::validation(format!(
                "negative balance policy must be 'reject' or 'backorder', got '{other}'"
            ))),
        }
    }
}

/// A correcting movement the reconciler must append.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StockAdjustment {
    pub kind: MovementKind,
    pub quantity: i64,
    pub reason: &'static str,
}

impl StockAdjustment {
    fn from_signed(diff: i64, reason: &'static str) -> DomainResult<Option<Self>> {
        let adjustment = match diff.signum() {
            1 => Some(Self {
                kind: MovementKind::In,
                quantity: diff,
                reason,
            }),
            -1 => {
                let quantity = diff
                    .checked_neg()
                    .ok_or_else(|| DomainError::validation("stock adjustment out of range"))?;
                Some(Self {
                    kind: MovementKind::Out,
                    quantity,
                    reason,
                })
            }
            _ => None,
        };
        Ok(adjustment)
    }

    pub fn into_movement(self, item_id: ItemId, moved_at: DateTime<Utc>) -> NewMovement {
        NewMovement {
            item_id,
            kind: self.kind,
            quantity: self.quantity,
            reason: Some(self.reason.to_string()),
            moved_at,
        }
    }
}

/// Decide the movement that brings the ledger balance to `declared`.
///
/// - Creation: the ledger is empty, so the whole declared stock is registered
///   as initial stock (nothing when it is zero).
/// - Update: `diff = declared - current_sum`; a positive diff is an IN, a
///   negative one an OUT, zero appends nothing. Running it again right after
///   applying its result therefore plans nothing.
///
/// The resulting balance always equals `declared`, so that is what the policy
/// judges.
pub fn plan_stock_adjustment(
    item_id: ItemId,
    current_sum: i64,
    declared: i64,
    is_creation: bool,
    policy: NegativeBalancePolicy,
) -> DomainResult<Option<StockAdjustment>> {
    policy.check(item_id, declared)?;

    if is_creation {
        return StockAdjustment::from_signed(declared, INITIAL_STOCK_REASON);
    }

    let diff = declared
        .checked_sub(current_sum)
        .ok_or_else(|| DomainError::validation("stock adjustment out of range"))?;
    StockAdjustment::from_signed(diff, ADJUSTMENT_REASON)
}
