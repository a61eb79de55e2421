//! Item state and its two audit ledgers (price history, stock movements).
//!
//! This crate contains the reconciliation rules, implemented purely as
//! deterministic domain logic (no IO, no storage). Persisting the decisions
//! taken here is the job of `stockrecon-infra`.

pub mod command;
pub mod item;
pub mod price;
pub mod price_history;
pub mod stock_movement;

pub use command::{CreateItem, RecordMovement, UpdateItem};
pub use item::Item;
pub use price::Price;
pub use price_history::{NewPriceEntry, PriceHistoryEntry, price_changed, sort_prices_newest_first};
pub use stock_movement::{
    ADJUSTMENT_REASON, INITIAL_STOCK_REASON, MovementKind, NegativeBalancePolicy, NewMovement,
    StockAdjustment, StockMovementEntry, plan_stock_adjustment, signed_balance,
    sort_movements_newest_first,
};
