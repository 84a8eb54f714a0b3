//! Gateway process entry point.

use anyhow::Result;
use gateway_node::{GatewayConfig, GatewayRuntime};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Configuration parsing (CLI and environment) happens upstream; the
    // defaults describe a mainnet gateway without a node websocket.
    let config = GatewayConfig::default();

    let runtime = GatewayRuntime::new(config);
    runtime.start();

    info!("Gateway is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown();
    info!("Shutdown complete.");
    Ok(())
}
