//! # Cloudspend Service Entry Point
//!
//! Loads configuration, prepares the database and provider catalog, then
//! serves the HTTP API (and the bulk-sync scheduler when enabled).

use anyhow::Context;
use cloudspend::{
    config::ConfigLoader, db, providers::Registry, seeds::seed_providers, server::run_server,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    telemetry::init_tracing(&config)?;
    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let db = db::init_pool(&config).await?;
    db::run_migrations(&db).await?;

    let registry = Registry::from_config(&config).context("building provider registry")?;
    seed_providers(&db, &registry).await?;

    run_server(config, db, registry).await
}
