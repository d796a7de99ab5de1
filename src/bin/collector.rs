//! telemetry-collector: accepts the batches nodes upload.
//!
//! Reads the `[collector]` and `[logging]` sections of the same node.toml.

use anyhow::Result;
use telemetry_node::config::NodeConfig;
use telemetry_node::{collector, init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::load_or_default();
    init_logging(&config.logging.level);

    if let Err(e) = collector::serve(&config.collector).await {
        tracing::error!("Collector error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
