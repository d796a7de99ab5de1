//! ==============================================================================
//! config.rs - Node Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `node.toml`.
//!     loads configuration from file or falls back to defaults.
//!     the node reads this once at boot and never reconfigures at runtime.
//!
//! structure:
//!     - SamplingConfig: How often the sampler polls sensors.
//!     - UploadConfig: Collector endpoint, upload cadence and network timeouts.
//!     - BufferConfig: Optional byte cap on the pending batch.
//!     - SensorsConfig: I2C bus, failure policy and per-sensor toggles.
//!     - LoggingConfig: Default filter and reading verbosity.
//!     - CollectorConfig: Listen address for the companion collector binary.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV: &str = "TELEMETRY_CONFIG";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct NodeConfig {
    pub sampling: SamplingConfig,
    pub upload: UploadConfig,
    pub buffer: BufferConfig,
    pub sensors: SensorsConfig,
    pub logging: LoggingConfig,
    pub collector: CollectorConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SamplingConfig {
    pub interval_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UploadConfig {
    pub interval_ms: u64,
    /// collector url batches are POSTed to
    pub endpoint: String,
    pub content_type: String,
    pub request_timeout_ms: u64,
    /// bound on the tcp reachability probe run before each drain
    pub probe_timeout_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            endpoint: "http://127.0.0.1:8080/data".to_string(),
            content_type: "application/json".to_string(),
            request_timeout_ms: 10_000,
            probe_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BufferConfig {
    /// drop the pending batch once it would grow past this many bytes
    pub max_bytes: Option<usize>,
}

/// What the startup supervisor does when a sensor fails to initialize.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// refuse to start
    #[default]
    Halt,
    /// disable the failed sensor and keep going with the rest
    Degrade,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorsConfig {
    pub i2c_bus: u8,
    pub on_failure: FailurePolicy,
    pub sht4x: Sht4xConfig,
    pub tsl2591: Tsl2591Config,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            on_failure: FailurePolicy::default(),
            sht4x: Sht4xConfig::default(),
            tsl2591: Tsl2591Config::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    High,
    Medium,
    Low,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Sht4xConfig {
    pub enabled: bool,
    pub precision: Precision,
}

impl Default for Sht4xConfig {
    fn default() -> Self {
        Self { enabled: true, precision: Precision::High }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Tsl2591Config {
    pub enabled: bool,
}

impl Default for Tsl2591Config {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CollectorConfig {
    pub listen: String,
    /// how many received entries GET /api keeps around
    pub history: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self { listen: "0.0.0.0:8080".to_string(), history: 256 }
    }
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl UploadConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl NodeConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    /// Parse configuration from toml text
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: NodeConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.sampling.interval_ms == 0 {
            anyhow::bail!("sampling.interval_ms must be greater than zero");
        }
        if self.upload.interval_ms == 0 {
            anyhow::bail!("upload.interval_ms must be greater than zero");
        }
        Ok(())
    }

    /// Load with default fallback
    ///
    /// An explicit `TELEMETRY_CONFIG` path wins; otherwise the usual
    /// locations are tried in order.
    pub fn load_or_default() -> Self {
        let paths: Vec<PathBuf> = match std::env::var_os(CONFIG_ENV) {
            Some(path) => vec![PathBuf::from(path)],
            None => vec![
                PathBuf::from("config").join("node.toml"),
                PathBuf::from("..").join("config").join("node.toml"),
            ],
        };

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let enabled = |on: bool| if on { "on" } else { "off" };
        println!("┌─────────────────────────────────────────┐");
        println!("│           NODE CONFIGURATION            │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Endpoint: {}", self.upload.endpoint);
        println!("│ Sample Interval: {}ms", self.sampling.interval_ms);
        println!("│ Upload Interval: {}ms", self.upload.interval_ms);
        println!("│ SHT4x: {} | TSL2591: {}", enabled(self.sensors.sht4x.enabled), enabled(self.sensors.tsl2591.enabled));
        println!("│ On Sensor Failure: {:?}", self.sensors.on_failure);
        println!("│ Log Level: {}", self.logging.level);
        println!("├─────────────────────────────────────────┤");
    }
}
