//! portunusd — Portunus gateway daemon.
//!
//! Serves the `/ai/*` HTTP surface over a single shared [`Gateway`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use portunus::server::config::Config;
use portunus::server::{AppState, ForwardedIdentity, router};
use portunus::{GatewayBuilder, GatewayError, RateLimiter};

/// Portunus daemon — AI request gateway service.
#[derive(Parser)]
#[command(name = "portunusd")]
#[command(version = portunus::PKG_VERSION)]
#[command(about = "Portunus AI request gateway daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Address to bind to (overrides the config file).
    #[arg(short, long, env = "PORTUNUS_ADDRESS")]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: info; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(address) = args.address {
        config.server.address = address;
    }

    let addr: SocketAddr = config
        .server
        .address
        .parse()
        .map_err(|e| GatewayError::Configuration(format!("Invalid address: {e}")))?;

    let limiter = Arc::new(RateLimiter::new(config.gateway.rate_limit_config()));
    let gateway = Arc::new(GatewayBuilder::from_config(config.gateway)?.build()?);

    let sweeper = limiter
        .clone()
        .spawn_sweeper(Duration::from_secs(config.server.sweep_interval_secs.max(1)));

    let state = AppState::new(gateway, limiter).with_identity(Arc::new(ForwardedIdentity::new(
        config.server.user_header.as_str(),
    )));
    let app = router(state, config.server.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(version = portunus::version_string(), %addr, "portunusd starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("portunusd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received, draining connections");
}
