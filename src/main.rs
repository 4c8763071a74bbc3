//! # Tenancy Service Main Entry Point
//!
//! This is the main entry point for the tenancy service.

use migration::{Migrator, MigratorTrait};
use tenancy::{config::ConfigLoader, db, server::run_server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    telemetry::init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!("Configuration: {}", redacted_json);
    }

    let master_db = db::init_pool(&config).await?;
    Migrator::up(&master_db, None).await?;

    run_server(config, master_db).await
}
