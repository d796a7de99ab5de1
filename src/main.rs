//! ==============================================================================
//! main.rs - telemetry node entry point
//! ==============================================================================
//!
//! purpose:
//!     boots the node: config, logging, sensors, transport, then hands over
//!     to the two perpetual tasks (sampler + uploader).
//!
//! relationships:
//!     - uses: config.rs (node.toml)
//!     - uses: node.rs (startup supervisor, task wiring)
//!
//! runtime:
//!     two worker threads, one per task, so sampling and uploading really
//!     run in parallel. the blocking pool handles the i2c transactions.
//!
//! ==============================================================================

use anyhow::Result;
use telemetry_node::config::NodeConfig;
use telemetry_node::{init_logging, node};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Telemetry Node");
    println!("  SHT4x + TSL2591 -> batch -> collector");
    println!("===========================================================");

    // step 1: load configuration
    let config = NodeConfig::load_or_default();
    config.print_summary();
    init_logging(&config.logging.level);

    // step 2: bring up sensors and transport
    let node = match node::boot(&config) {
        Ok(node) => node,
        Err(e) => {
            tracing::error!("Fatal: {}", e);
            return Err(e.into());
        }
    };

    // step 3: run until a task dies
    println!("\n[RUNTIME] Sampling every {}ms, uploading every {}ms", config.sampling.interval_ms, config.upload.interval_ms);
    println!("────────────────────────────────────────────────────────────");
    if let Err(e) = node.run().await {
        tracing::error!("Fatal: {}", e);
        return Err(e.into());
    }
    Ok(())
}
