//! Encore relay - main entry point
//!
//! HTTP relay for room sync events: POST to publish, SSE to subscribe.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use encore_common::config::TomlConfig;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for encore-relay
#[derive(Parser, Debug)]
#[command(name = "encore-relay")]
#[command(about = "Room sync event relay for encore")]
#[command(version)]
struct Args {
    /// Config file (overrides ENCORE_CONFIG)
    #[arg(short, long, env = "ENCORE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "ENCORE_RELAY_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides config)
    #[arg(short, long, env = "ENCORE_RELAY_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise the configured level replaces this once loaded
    let from_env = EnvFilter::try_from_default_env().ok();
    let use_config_level = from_env.is_none();
    let (filter, filter_handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| EnvFilter::new(log_filter("info"))));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = TomlConfig::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(port) = args.port {
        config.relay.port = port;
    }
    if let Some(bind) = args.bind {
        config.relay.bind = bind;
    }
    config.validate().context("Invalid configuration")?;

    if use_config_level {
        if let Err(e) = filter_handle.reload(EnvFilter::new(log_filter(&config.logging.level))) {
            warn!("Could not apply configured log level: {}", e);
        }
    }

    info!(
        "Starting encore relay v{} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.relay.bind,
        config.relay.port
    );

    encore_relay::api::run(&config, shutdown_signal())
        .await
        .context("Relay server error")?;
    Ok(())
}

fn log_filter(level: &str) -> String {
    format!("encore_relay={0},encore_common={0},tower_http={0}", level)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_level_builds_a_filter() {
        let level = TomlConfig::default().logging.level;
        let filter = EnvFilter::try_new(log_filter(&level)).unwrap();
        assert!(filter.to_string().contains("encore_relay="));
    }
}
