//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and the catalog service
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use stockrecon_infra::EngineConfig;
use stockrecon_infra::store::StoreError;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router around already-wired services.
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}

/// Wire the store selected by `config` and build the router (used by `main.rs`).
pub async fn build_app_from_config(config: &EngineConfig) -> Result<Router, StoreError> {
    let services = Arc::new(services::build_services(config).await?);
    Ok(build_app(services))
}
