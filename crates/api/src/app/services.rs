use std::sync::Arc;

use stockrecon_infra::store::{CatalogStore, InMemoryCatalogStore, StoreError, build_store};
use stockrecon_infra::{CatalogService, EngineConfig};
use stockrecon_ledger::NegativeBalancePolicy;

pub type DynStore = Arc<dyn CatalogStore>;

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    catalog: CatalogService<DynStore>,
}

impl AppServices {
    pub fn new(store: DynStore, policy: NegativeBalancePolicy) -> Self {
        Self {
            catalog: CatalogService::new(store, policy),
        }
    }

    /// In-memory wiring for tests and local runs.
    pub fn in_memory(policy: NegativeBalancePolicy) -> Self {
        Self::new(Arc::new(InMemoryCatalogStore::new()), policy)
    }

    pub fn catalog(&self) -> &CatalogService<DynStore> {
        &self.catalog
    }
}

pub async fn build_services(config: &EngineConfig) -> Result<AppServices, StoreError> {
    let store = build_store(config).await?;
    tracing::info!(policy = ?config.negative_balance, "catalog services ready");
    Ok(AppServices::new(store, config.negative_balance))
}
