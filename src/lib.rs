//! telemetry-node: sample I2C environment sensors, batch the readings, ship
//! them to a collector.
//!
//! The node runs two tasks forever. The sampler polls every enabled sensor
//! once a second and appends one json record per reading to a shared batch;
//! the light sensor's gain/exposure is auto-ranged from its own readings.
//! The uploader drains the batch every five seconds and POSTs it as a json
//! array. The collector binary is the receiving side.

pub mod autorange;
pub mod buffer;
pub mod collector;
pub mod config;
pub mod domain;
pub mod hal;
pub mod node;
pub mod sampler;
pub mod sensor;
pub mod sht4x;
pub mod transport;
pub mod tsl2591;
pub mod uploader;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// installs the global subscriber; `RUST_LOG` overrides `default_level`
pub fn init_logging(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
