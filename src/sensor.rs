//! Sensor capability - what the sampler needs from a piece of hardware
//!
//! Each hardware kind implements [`Sensor`]; the sampler iterates over a
//! collection of enabled instances and never knows which chip it talks to.

use crate::autorange::SensitivityLevel;
use crate::domain::{Reading, SensorKind};
use crate::hal::HalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorError {
    /// the chip did not answer or identified as something else
    #[error("{0} not found: {1}")]
    NotFound(SensorKind, String),
    #[error("bus transfer failed: {0}")]
    Bus(#[from] HalError),
    /// a checksum or frame length did not match
    #[error("invalid data: {0}")]
    InvalidData(String),
    /// the sensor produced nothing this cycle
    #[error("no data")]
    NoData,
}

pub trait Sensor: Send {
    fn kind(&self) -> SensorKind;

    /// probe and bring the chip into its measuring state
    fn begin(&mut self) -> Result<(), SensorError>;

    /// apply a sensitivity level; sensors without ranging ignore it
    fn configure(&mut self, _level: SensitivityLevel) -> Result<(), SensorError> {
        Ok(())
    }

    fn poll(&mut self) -> Result<Reading, SensorError>;
}
