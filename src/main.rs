mod annotations;
mod app;
mod catalog;
mod config;
mod controls;
mod error;
mod messages;
mod overlay;
mod sequence;
mod services;
mod transport;
mod video;

use app::App;
use config::Config;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting fretsight camera tutor");

    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    App::new(config).await?.run().await?;

    tracing::info!("Fretsight shutdown complete");
    Ok(())
}
