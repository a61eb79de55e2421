//! Storage boundary for items and their two ledgers.
//!
//! Writers go through a per-item [`ItemTransaction`]; readers use the
//! committed-data methods of [`CatalogStore`]. Both backends give the same
//! guarantees: one writer per item at a time, all-or-nothing commits, and
//! newest-first ledger reads.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

use std::sync::Arc;

pub use in_memory::{DEFAULT_LOCK_TIMEOUT, InMemoryCatalogStore};
pub use postgres::PostgresCatalogStore;
pub use query::DateRange;
pub use r#trait::{CatalogStore, ItemTransaction, StoreError};

use crate::config::{EngineConfig, StoreBackend};

/// Build the store selected by `config`, applying the schema for Postgres.
pub async fn build_store(config: &EngineConfig) -> Result<Arc<dyn CatalogStore>, StoreError> {
    match &config.store {
        StoreBackend::InMemory => {
            tracing::info!("using in-memory catalog store");
            Ok(Arc::new(InMemoryCatalogStore::with_lock_timeout(config.lock_timeout)))
        }
        StoreBackend::Postgres { database_url } => {
            let store = PostgresCatalogStore::connect(database_url)
                .await?
                .with_lock_timeout(config.lock_timeout);
            store.migrate().await?;
            tracing::info!("using postgres catalog store");
            Ok(Arc::new(store))
        }
    }
}
