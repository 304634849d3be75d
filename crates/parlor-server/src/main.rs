//! # Parlor Server
//!
//! Multi-room realtime chat server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! parlor
//!
//! # Run with environment variables
//! PARLOR_PORT=8080 PARLOR_HOST=0.0.0.0 parlor
//! ```
//!
//! A `parlor.toml` in the working directory, `/etc/parlor/` or
//! `~/.config/parlor/` is picked up automatically.

use anyhow::{Context, Result};
use parlor_server::{config::Config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor=debug,parlor_core=debug,parlor_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load configuration")?;

    tracing::info!("Starting Parlor server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
