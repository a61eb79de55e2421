use chrono::NaiveDate;
use serde::Deserialize;

use stockrecon_core::ExpectedVersion;
use stockrecon_infra::{CommittedItem, RecordedMovement, ReconcileOutcome};
use stockrecon_ledger::{Item, MovementKind, PriceHistoryEntry, StockMovementEntry};

// -------------------------
// Request DTOs
// -------------------------

/// Prices are strings: `"1234.56"` or the localized `"1.234,56"`.
#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    /// Client-chosen id; a new one is generated when absent.
    pub id: Option<String>,
    pub price: String,
    pub stock: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub price: String,
    pub stock: i64,
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RecordMovementRequest {
    pub kind: MovementKind,
    pub quantity: i64,
    pub reason: Option<String>,
    pub expected_version: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PriceHistoryQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub fn expected_version(v: Option<u64>) -> ExpectedVersion {
    ExpectedVersion::from(v)
}

// -------------------------
// Response mapping
// -------------------------

pub fn item_to_json(item: &Item) -> serde_json::Value {
    serde_json::json!({
        "id": item.id().to_string(),
        "price": item.price().to_string(),
        "stock": item.stock(),
        "version": item.version(),
        "created_at": item.created_at(),
        "updated_at": item.updated_at(),
    })
}

pub fn price_entry_to_json(e: &PriceHistoryEntry) -> serde_json::Value {
    serde_json::json!({
        "sequence": e.sequence,
        "item_id": e.item_id.to_string(),
        "price": e.price.to_string(),
        "recorded_at": e.recorded_at,
    })
}

pub fn movement_to_json(m: &StockMovementEntry) -> serde_json::Value {
    serde_json::json!({
        "sequence": m.sequence,
        "item_id": m.item_id.to_string(),
        "kind": m.kind.as_str(),
        "quantity": m.quantity,
        "reason": m.reason,
        "moved_at": m.moved_at,
    })
}

fn outcome_to_json(outcome: &ReconcileOutcome) -> serde_json::Value {
    serde_json::json!({
        "price_entry": outcome.price_entry.as_ref().map(price_entry_to_json),
        "movement": outcome.movement.as_ref().map(movement_to_json),
    })
}

pub fn committed_to_json(committed: &CommittedItem) -> serde_json::Value {
    serde_json::json!({
        "item": item_to_json(&committed.item),
        "ledger": outcome_to_json(&committed.outcome),
    })
}

pub fn recorded_movement_to_json(recorded: &RecordedMovement) -> serde_json::Value {
    serde_json::json!({
        "item": item_to_json(&recorded.item),
        "movement": movement_to_json(&recorded.movement),
        "ledger": outcome_to_json(&recorded.outcome),
    })
}
