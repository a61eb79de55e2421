//! Infrastructure layer: storage backends, the reconciliation write path, config.

pub mod catalog;
pub mod config;
pub mod reconciler;
pub mod store;


pub use catalog::{CatalogError, CatalogService, CommittedItem, RecordedMovement};
pub use config::{ConfigError, EngineConfig, StoreBackend};
pub use reconciler::{ReconcileOutcome, Reconciler};
