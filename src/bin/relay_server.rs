//! Relay server binary.
//!
//! Loads configuration from `$INTERVOX_CONFIG` (default `intervox.toml` in
//! the working directory), starts the HTTP relay, and runs until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use intervox::provider::hosted::HostedProvider;
use intervox::relay::{RelayServer, RelayState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var("INTERVOX_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("intervox.toml"));
    let config = intervox::Config::load(&config_path)
        .map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?;

    let provider = Arc::new(HostedProvider::new(config.provider.clone()));
    let state = RelayState::new(config, provider);

    let server = RelayServer::start(state)
        .await
        .map_err(|e| anyhow::anyhow!("relay failed to start: {e}"))?;
    tracing::info!("intervox relay ready on port {}", server.port());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    server.shutdown();
    Ok(())
}
