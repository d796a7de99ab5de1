//! ==============================================================================
//! sht4x.rs - Sensirion SHT4x temperature / humidity driver
//! ==============================================================================
//!
//! protocol:
//!     single-byte commands, then a 6 byte response: two big-endian words
//!     each followed by a crc-8 (poly 0x31, init 0xFF). the chip nacks reads
//!     until the conversion finishes, so we wait the datasheet max first.
//!
//! ==============================================================================

use crate::config::Precision;
use crate::domain::{Reading, SensorKind};
use crate::hal::I2cBus;
use crate::sensor::{Sensor, SensorError};

pub const ADDRESS: u8 = 0x44;

pub const CMD_SOFT_RESET: u8 = 0x94;
pub const CMD_READ_SERIAL: u8 = 0x89;
const CMD_MEASURE_HIGH: u8 = 0xFD;
const CMD_MEASURE_MEDIUM: u8 = 0xF6;
const CMD_MEASURE_LOW: u8 = 0xE0;

/// crc-8 as used by sensirion parts
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x31 } else { crc << 1 };
        }
    }
    crc
}

/// splits a 6 byte response into its two words, checking both crcs
fn decode_words(frame: &[u8]) -> Result<(u16, u16), SensorError> {
    if frame.len() != 6 {
        return Err(SensorError::InvalidData(format!("expected 6 bytes, got {}", frame.len())));
    }
    let word = |chunk: &[u8]| -> Result<u16, SensorError> {
        if crc8(&chunk[..2]) != chunk[2] {
            return Err(SensorError::InvalidData("crc mismatch".to_string()));
        }
        Ok(u16::from_be_bytes([chunk[0], chunk[1]]))
    };
    Ok((word(&frame[..3])?, word(&frame[3..])?))
}

/// degrees celsius from the raw temperature word
pub fn temperature(ticks: u16) -> f64 {
    -45.0 + 175.0 * ticks as f64 / 65535.0
}

/// relative humidity from the raw word, clamped to the physical range
pub fn humidity(ticks: u16) -> f64 {
    (-6.0 + 125.0 * ticks as f64 / 65535.0).clamp(0.0, 100.0)
}

pub struct Sht4x<B> {
    bus: B,
    precision: Precision,
}

impl<B: I2cBus> Sht4x<B> {
    pub fn new(bus: B, precision: Precision) -> Self {
        Self { bus, precision }
    }

    fn command(&mut self, cmd: u8, wait_ms: u64) -> Result<(u16, u16), SensorError> {
        self.bus.write(ADDRESS, &[cmd])?;
        self.bus.delay_ms(wait_ms);
        let frame = self.bus.read(ADDRESS, 6)?;
        decode_words(&frame)
    }

    fn measure_command(&self) -> (u8, u64) {
        match self.precision {
            Precision::High => (CMD_MEASURE_HIGH, 10),
            Precision::Medium => (CMD_MEASURE_MEDIUM, 5),
            Precision::Low => (CMD_MEASURE_LOW, 2),
        }
    }
}

impl<B: I2cBus> Sensor for Sht4x<B> {
    fn kind(&self) -> SensorKind {
        SensorKind::Sht4x
    }

    fn begin(&mut self) -> Result<(), SensorError> {
        let not_found = |e: SensorError| SensorError::NotFound(SensorKind::Sht4x, e.to_string());

        self.bus
            .write(ADDRESS, &[CMD_SOFT_RESET])
            .map_err(|e| not_found(e.into()))?;
        self.bus.delay_ms(1);

        let (high, low) = self.command(CMD_READ_SERIAL, 10).map_err(not_found)?;
        tracing::info!(
            "Found SHT4x sensor, serial 0x{:08X}, {:?} precision",
            (high as u32) << 16 | low as u32,
            self.precision
        );
        Ok(())
    }

    fn poll(&mut self) -> Result<Reading, SensorError> {
        let (cmd, wait_ms) = self.measure_command();
        let (t_ticks, rh_ticks) = self.command(cmd, wait_ms)?;
        Ok(Reading::climate(SensorKind::Sht4x, temperature(t_ticks), humidity(rh_ticks)))
    }
}
