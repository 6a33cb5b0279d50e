//! Manifold daemon
//!
//! Serves `POST /api/chat/stream`, which runs one task per request and
//! streams its external events as server-sent events.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use manifold_core::metrics::METRICS;
use manifold_core::telemetry;
use manifold_core::{build_driver, ManifoldConfig};

mod server;

#[derive(Parser)]
#[command(name = "manifoldd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Manifold streaming run server", long_about = None)]
struct Cli {
    /// Log at debug level, overriding the configured filter
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON log lines, overriding the configured format
    #[arg(long)]
    json: bool,

    /// Configuration file (TOML)
    #[arg(short, long, env = "MANIFOLD_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Listen address, overriding the configured one
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ManifoldConfig::resolve(cli.config.as_deref())
        .context("Failed to load manifold configuration")?;
    telemetry::init_tracing(&config.log.clone().with_flags(cli.json, cli.verbose));
    let driver = build_driver(&config).context("Failed to assemble run driver")?;
    let app = server::router(server::AppState {
        driver: Arc::new(driver),
    });

    let bind_addr = cli.bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    info!(bind = %bind_addr, "manifoldd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown requested");
        })
        .await
        .context("Server error")?;

    METRICS.flush();
    Ok(())
}
