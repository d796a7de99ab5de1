//! ==============================================================================
//! node.rs - startup supervisor and task wiring
//! ==============================================================================
//!
//! purpose:
//!     owns everything the two tasks share and decides what happens when
//!     startup goes wrong. there are no process-wide singletons: the buffer
//!     is created here and a clone is handed to each task.
//!
//! architecture:
//!
//! ```text
//!     ┌──────────────────────────────────────────────────────────┐
//!     │                        Node                              │
//!     │   ┌──────────────┐   SharedBuffer   ┌────────────────┐   │
//!     │   │ SamplerTask  │ ───── append ──► │ UploaderTask   │   │
//!     │   │ (1s cycle)   │ ◄──── drain ──── │ (5s cycle)     │   │
//!     │   └──────┬───────┘                  └───────┬────────┘   │
//!     │          │ i2c                              │ http       │
//!     └──────────┼──────────────────────────────────┼────────────┘
//!                ▼                                  ▼
//!        SHT4x / TSL2591                        collector
//! ```
//!
//! failure policy:
//!     sensor startup errors surface as `FatalError`. with `halt` the first
//!     one stops the boot; with `degrade` the failed sensor is dropped and
//!     the node runs with whatever is left.
//!
//! ==============================================================================

use crate::buffer::SharedBuffer;
use crate::config::{FailurePolicy, NodeConfig, SensorsConfig};
use crate::hal::{self, HalError};
use crate::sampler::SamplerTask;
use crate::sensor::{Sensor, SensorError};
use crate::sht4x::Sht4x;
use crate::transport::{HttpTransport, Transport, TransportError};
use crate::tsl2591::Tsl2591;
use crate::uploader::UploaderTask;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FatalError {
    #[error("sensor failed to start: {0}")]
    SensorInit(#[source] SensorError),
    #[error("no sensors available")]
    NoSensors,
    #[error("cannot open i2c bus {bus}: {source}")]
    Bus {
        bus: u8,
        #[source]
        source: HalError,
    },
    #[error("collector endpoint: {0}")]
    Transport(#[from] TransportError),
    #[error("{task} task stopped: {reason}")]
    TaskStopped { task: &'static str, reason: String },
}

/// constructs a driver for every sensor enabled in the config, in wire order
pub fn enabled_sensors(config: &SensorsConfig) -> Result<Vec<Box<dyn Sensor>>, FatalError> {
    let open = || hal::open(config.i2c_bus).map_err(|source| FatalError::Bus { bus: config.i2c_bus, source });

    let mut sensors: Vec<Box<dyn Sensor>> = Vec::new();
    if config.sht4x.enabled {
        sensors.push(Box::new(Sht4x::new(open()?, config.sht4x.precision)));
    }
    if config.tsl2591.enabled {
        sensors.push(Box::new(Tsl2591::new(open()?)));
    }
    Ok(sensors)
}

/// runs `begin` on every sensor and applies the failure policy
pub fn start_sensors(
    sensors: Vec<Box<dyn Sensor>>,
    policy: FailurePolicy,
) -> Result<Vec<Box<dyn Sensor>>, FatalError> {
    let mut started = Vec::with_capacity(sensors.len());
    for mut sensor in sensors {
        match sensor.begin() {
            Ok(()) => started.push(sensor),
            Err(e) => match policy {
                FailurePolicy::Halt => {
                    tracing::error!(sensor = %sensor.kind(), "sensor failed to start: {}", e);
                    return Err(FatalError::SensorInit(e));
                }
                FailurePolicy::Degrade => {
                    tracing::warn!(sensor = %sensor.kind(), "sensor failed to start, disabling it: {}", e);
                }
            },
        }
    }

    if started.is_empty() {
        return Err(FatalError::NoSensors);
    }
    Ok(started)
}

/// the running node: one buffer, one sampler, one uploader
pub struct Node<T> {
    buffer: SharedBuffer,
    sampler: SamplerTask,
    uploader: UploaderTask<T>,
}

impl<T: Transport + 'static> Node<T> {
    /// wires already-started sensors and a transport around a fresh buffer
    pub fn new(config: &NodeConfig, sensors: Vec<Box<dyn Sensor>>, transport: T) -> Self {
        let buffer = SharedBuffer::with_max_bytes(config.buffer.max_bytes);
        let sampler = SamplerTask::new(sensors, buffer.clone(), config.sampling.interval())
            .show_data(config.logging.show_sensor_data);
        let uploader = UploaderTask::new(transport, buffer.clone(), config.upload.endpoint.clone(), config.upload.interval())
            .content_type(config.upload.content_type.clone());
        Self { buffer, sampler, uploader }
    }

    #[cfg(test)]
    fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    /// starts both tasks and only returns if one of them stops
    pub async fn run(self) -> Result<(), FatalError> {
        let mut sampler = tokio::spawn(self.sampler.run());
        let mut uploader = tokio::spawn(self.uploader.run());

        let err = tokio::select! {
            res = &mut sampler => {
                let reason = match res {
                    Ok(Ok(())) => "exited".to_string(),
                    Ok(Err(e)) => format!("{:#}", e),
                    Err(e) => e.to_string(),
                };
                uploader.abort();
                FatalError::TaskStopped { task: "sampler", reason }
            }
            res = &mut uploader => {
                let reason = match res {
                    Ok(()) => "exited".to_string(),
                    Err(e) => e.to_string(),
                };
                sampler.abort();
                FatalError::TaskStopped { task: "uploader", reason }
            }
        };
        Err(err)
    }
}

/// everything between reading the config and spawning the tasks
pub fn boot(config: &NodeConfig) -> Result<Node<HttpTransport>, FatalError> {
    let transport = HttpTransport::new(
        &config.upload.endpoint,
        config.upload.request_timeout(),
        config.upload.probe_timeout(),
    )?;

    let sensors = enabled_sensors(&config.sensors)?;
    if sensors.is_empty() {
        return Err(FatalError::NoSensors);
    }
    let sensors = start_sensors(sensors, config.sensors.on_failure)?;
    let names: Vec<&str> = sensors.iter().map(|s| s.kind().name()).collect();
    tracing::info!(sensors = %names.join(", "), "sensors ready");

    Ok(Node::new(config, sensors, transport))
}
