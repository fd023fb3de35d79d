//! # Launchpad Main Entry Point
//!
//! Loads configuration, runs registry migrations, builds the provider
//! clients, and starts the fleet-admin API server.

use std::sync::Arc;

use migration::{Migrator, MigratorTrait};
use tokio_util::sync::CancellationToken;

use launchpad::catalog::MigrationCatalog;
use launchpad::config::ConfigLoader;
use launchpad::crypto::CryptoKey;
use launchpad::provider::{hosting::HostingClient, management::ManagementClient};
use launchpad::server::{AppState, run_server};
use launchpad::{db, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::new().load()?;
    config.validate()?;

    telemetry::init_tracing(&config)?;

    if let Ok(redacted_json) = config.redacted_json() {
        tracing::info!(profile = %config.profile, configuration = %redacted_json, "Configuration loaded");
    }

    let key_bytes = config
        .crypto_key
        .clone()
        .ok_or("LAUNCHPAD_CRYPTO_KEY must be set")?;
    let crypto_key = CryptoKey::new(key_bytes)?;

    let db = db::init_pool(&config).await?;
    Migrator::up(&db, None).await?;

    let catalog = Arc::new(MigrationCatalog::load(&config));
    tracing::info!(
        migrations = catalog.len(),
        latest = ?catalog.latest_version(),
        "Migration catalog loaded"
    );

    let config = Arc::new(config);
    let state = AppState::new(
        Arc::clone(&config),
        db,
        catalog,
        Arc::new(ManagementClient::from_config(&config)),
        Arc::new(HostingClient::from_config(&config)),
        crypto_key,
        CancellationToken::new(),
    );

    run_server(state).await
}
