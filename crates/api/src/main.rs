use anyhow::Context;

use stockrecon_infra::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockrecon_observability::init();

    let config = EngineConfig::from_env().context("invalid configuration")?;
    let app = stockrecon_api::app::build_app_from_config(&config)
        .await
        .context("failed to initialise catalog store")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
