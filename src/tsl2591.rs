//! ==============================================================================
//! tsl2591.rs - ams TSL2591 light sensor driver
//! ==============================================================================
//!
//! purpose:
//!     reads the full-spectrum (ch0) and infrared (ch1) channels and turns
//!     them into lux. gain and integration time come from the current
//!     sensitivity level and are changed by the sampler's auto-ranging.
//!
//! protocol:
//!     every register access is prefixed with the command bit. the chip is
//!     powered up only for the duration of one conversion.
//!
//! ==============================================================================

use crate::autorange::{Gain, IntegrationTime, SensitivityLevel};
use crate::domain::{Reading, SensorKind};
use crate::hal::I2cBus;
use crate::sensor::{Sensor, SensorError};

pub const ADDRESS: u8 = 0x29;
pub const DEVICE_ID: u8 = 0x50;

pub const COMMAND_BIT: u8 = 0xA0;
pub const REG_ENABLE: u8 = 0x00;
pub const REG_CONTROL: u8 = 0x01;
pub const REG_ID: u8 = 0x12;
pub const REG_C0DATAL: u8 = 0x14;

pub const ENABLE_POWEROFF: u8 = 0x00;
pub const ENABLE_POWERON: u8 = 0x01;
pub const ENABLE_AEN: u8 = 0x02;
pub const ENABLE_AIEN: u8 = 0x10;
pub const ENABLE_NPIEN: u8 = 0x80;

/// device factor from the datasheet's lux equation
pub const LUX_DF: f64 = 408.0;

/// channel value reported on overflow
const OVERFLOW: u16 = 0xFFFF;

fn gain_bits(gain: Gain) -> u8 {
    match gain {
        Gain::Low => 0x00,
        Gain::Medium => 0x10,
        Gain::High => 0x20,
        Gain::Max => 0x30,
    }
}

fn integration_bits(integration: IntegrationTime) -> u8 {
    match integration {
        IntegrationTime::Ms100 => 0x00,
        IntegrationTime::Ms200 => 0x01,
        IntegrationTime::Ms300 => 0x02,
        IntegrationTime::Ms400 => 0x03,
        IntegrationTime::Ms500 => 0x04,
        IntegrationTime::Ms600 => 0x05,
    }
}

/// CONTROL register value for a gain/integration pair
pub fn encode_control(gain: Gain, integration: IntegrationTime) -> u8 {
    gain_bits(gain) | integration_bits(integration)
}

/// inverse of [`encode_control`]; unknown integration codes read as 600 ms
pub fn decode_control(control: u8) -> (Gain, IntegrationTime) {
    let gain = match control & 0x30 {
        0x00 => Gain::Low,
        0x10 => Gain::Medium,
        0x20 => Gain::High,
        _ => Gain::Max,
    };
    let integration = match control & 0x07 {
        0x00 => IntegrationTime::Ms100,
        0x01 => IntegrationTime::Ms200,
        0x02 => IntegrationTime::Ms300,
        0x03 => IntegrationTime::Ms400,
        0x04 => IntegrationTime::Ms500,
        _ => IntegrationTime::Ms600,
    };
    (gain, integration)
}

/// illuminance from raw channel counts, None if either channel overflowed
pub fn lux(full: u16, infrared: u16, gain: Gain, integration: IntegrationTime) -> Option<f64> {
    if full == OVERFLOW || infrared == OVERFLOW {
        return None;
    }
    if full == 0 {
        return Some(0.0);
    }
    let cpl = integration.millis() as f64 * gain.multiplier() / LUX_DF;
    let (ch0, ch1) = (full as f64, infrared as f64);
    Some((ch0 - ch1) * (1.0 - ch1 / ch0) / cpl)
}

pub struct Tsl2591<B> {
    bus: B,
    level: SensitivityLevel,
}

impl<B: I2cBus> Tsl2591<B> {
    pub fn new(bus: B) -> Self {
        Self { bus, level: SensitivityLevel::DEFAULT }
    }

    /// level the chip is currently configured for
    #[cfg(test)]
    fn level(&self) -> SensitivityLevel {
        self.level
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        self.bus.write(ADDRESS, &[COMMAND_BIT | reg, value])?;
        Ok(())
    }

    fn read_registers(&mut self, reg: u8, len: usize) -> Result<Vec<u8>, SensorError> {
        let data = self.bus.write_read(ADDRESS, &[COMMAND_BIT | reg], len)?;
        if data.len() != len {
            return Err(SensorError::InvalidData(format!("expected {} bytes, got {}", len, data.len())));
        }
        Ok(data)
    }

    fn power(&mut self, on: bool) -> Result<(), SensorError> {
        let value = if on {
            ENABLE_POWERON | ENABLE_AEN | ENABLE_AIEN | ENABLE_NPIEN
        } else {
            ENABLE_POWEROFF
        };
        self.write_register(REG_ENABLE, value)
    }

    fn read_channels(&mut self) -> Result<(u16, u16), SensorError> {
        let (_, integration) = self.level.settings();
        self.power(true)?;
        // one integration cycle plus margin before both ADCs are valid
        self.bus.delay_ms(integration.millis() * 6 / 5);
        let data = self.read_registers(REG_C0DATAL, 4);
        self.power(false)?;
        let data = data?;
        Ok((
            u16::from_le_bytes([data[0], data[1]]),
            u16::from_le_bytes([data[2], data[3]]),
        ))
    }
}

impl<B: I2cBus> Sensor for Tsl2591<B> {
    fn kind(&self) -> SensorKind {
        SensorKind::Tsl2591
    }

    fn begin(&mut self) -> Result<(), SensorError> {
        let id = self
            .read_registers(REG_ID, 1)
            .map_err(|e| SensorError::NotFound(SensorKind::Tsl2591, e.to_string()))?;
        if id[0] != DEVICE_ID {
            return Err(SensorError::NotFound(
                SensorKind::Tsl2591,
                format!("unexpected id 0x{:02X}", id[0]),
            ));
        }
        tracing::info!("Found TSL2591 sensor, ID 0x{:02X}", id[0]);

        self.configure(self.level)?;
        self.power(false)
    }

    fn configure(&mut self, level: SensitivityLevel) -> Result<(), SensorError> {
        let (gain, integration) = level.settings();
        self.write_register(REG_CONTROL, encode_control(gain, integration))?;
        self.level = level;
        tracing::debug!(level = level.get(), ?gain, integration_ms = integration.millis(), "TSL2591 configured");
        Ok(())
    }

    fn poll(&mut self) -> Result<Reading, SensorError> {
        let (full, infrared) = self.read_channels()?;
        let (gain, integration) = self.level.settings();
        Ok(Reading::light(
            SensorKind::Tsl2591,
            full,
            infrared,
            lux(full, infrared, gain, integration),
        ))
    }
}
