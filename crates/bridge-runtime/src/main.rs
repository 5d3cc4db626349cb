//! Editor bridge runtime entry point.

use anyhow::{Context, Result};
use bridge_runtime::telemetry::init_tracing;
use bridge_runtime::{BridgeRuntime, RuntimeConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::from_env();
    init_tracing(&config).context("failed to initialize logging")?;

    let runtime = BridgeRuntime::new(&config).context("failed to build runtime")?;
    runtime.start().await.context("failed to start bridge server")?;

    info!("Bridge is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;

    Ok(())
}
