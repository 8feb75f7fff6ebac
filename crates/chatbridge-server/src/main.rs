//! # chatbridge
//!
//! WebSocket host for the chatbridge command and notification protocol.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! chatbridge
//!
//! # Run with a specific config file (used as-is, no layering)
//! CHATBRIDGE_CONFIG=/path/to/chatbridge.toml chatbridge
//!
//! # Override settings from the environment
//! CHATBRIDGE_PORT=8080 CHATBRIDGE_BACKEND__ACCEPTED_TOKENS=secret chatbridge
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatbridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::var("CHATBRIDGE_CONFIG") {
        Ok(path) => config::Config::from_file(path)?,
        Err(_) => config::Config::load()?,
    };

    tracing::info!("Starting chatbridge on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
