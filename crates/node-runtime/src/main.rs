//! # Issuer Node
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from `ISSUER_*` environment variables
//! 2. Install logging
//! 3. Build subsystems in dependency order (KMS → engine → gateway →
//!    prover → publisher)
//! 4. Ensure an issuer identity exists
//! 5. Spawn the publication loop and the reverse-hash forwarder
//!
//! Ctrl+C flips the shutdown watch channel. In-flight confirmation waits
//! stop without reverting their transactions; the next start resumes them
//! by hash.

use anyhow::{Context, Result};
use node_runtime::logging::init_logging;
use node_runtime::{IssuerConfig, IssuerNode};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = IssuerConfig::from_env().context("Failed to load configuration")?;
    init_logging(&config.log)?;

    info!("===========================================");
    info!("  Identity Issuer Node v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let node = IssuerNode::build(config)
        .await
        .context("Failed to build issuer node")?;
    let identity = node
        .bootstrap_identity()
        .await
        .context("Failed to provision issuer identity")?;
    info!(did = %identity.identifier, "Issuer identity ready");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let tasks = node.start(shutdown_rx);

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    info!("Initiating graceful shutdown...");
    if let Err(e) = shutdown_tx.send(true) {
        error!("Failed to send shutdown signal: {}", e);
    }
    for task in tasks {
        if let Err(e) = task.await {
            error!("Task ended abnormally: {}", e);
        }
    }
    info!("Shutdown complete");

    Ok(())
}
