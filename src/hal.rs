//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for the I2C bus the sensors sit on.
//!     abstracts away the difference between running on a real Raspberry Pi
//!     (using `rppal`) and a development machine (using a simulated bus).
//!
//! design philosophy:
//!     - "Compile Anywhere": The node should compile on Windows/Mac/Linux.
//!     - "Zero Cost": On the Pi, this compiles down to direct `rppal` calls.
//!     - "Own Your Bus": each driver owns its bus handle, nothing is global.
//!
//! relationships:
//!     - used by: sht4x.rs, tsl2591.rs (register level transactions)
//!     - used by: node.rs (opens one handle per enabled sensor)
//!     - uses: rppal (on feature="hardware")
//!
//! ==============================================================================

use crate::sht4x;
use crate::tsl2591;

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HalError {
    /// nothing acknowledged the address
    #[error("no device acknowledged address 0x{0:02X}")]
    Nack(u8),
    #[error("i2c bus error: {0}")]
    Bus(String),
}

pub trait I2cBus: Send {
    fn write(&mut self, addr: u8, data: &[u8]) -> Result<(), HalError>;
    fn read(&mut self, addr: u8, read_len: usize) -> Result<Vec<u8>, HalError>;
    fn write_read(&mut self, addr: u8, data: &[u8], read_len: usize) -> Result<Vec<u8>, HalError>;

    /// wait for a conversion to finish
    fn delay_ms(&mut self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

impl<B: I2cBus + ?Sized> I2cBus for Box<B> {
    fn write(&mut self, addr: u8, data: &[u8]) -> Result<(), HalError> {
        (**self).write(addr, data)
    }

    fn read(&mut self, addr: u8, read_len: usize) -> Result<Vec<u8>, HalError> {
        (**self).read(addr, read_len)
    }

    fn write_read(&mut self, addr: u8, data: &[u8], read_len: usize) -> Result<Vec<u8>, HalError> {
        (**self).write_read(addr, data, read_len)
    }

    fn delay_ms(&mut self, ms: u64) {
        (**self).delay_ms(ms)
    }
}

/// open the bus the sensors are wired to
#[cfg(feature = "hardware")]
pub fn open(bus: u8) -> Result<Box<dyn I2cBus>, HalError> {
    tracing::info!(bus, "Using REAL HARDWARE HAL (rppal)");
    Ok(Box::new(RppalBus::new(bus)?))
}

/// open the bus the sensors are wired to
#[cfg(not(feature = "hardware"))]
pub fn open(bus: u8) -> Result<Box<dyn I2cBus>, HalError> {
    tracing::info!(bus, "Using SIMULATED HAL (No hardware access)");
    Ok(Box::new(SimulatedBus::new()))
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================
#[cfg(feature = "hardware")]
pub struct RppalBus {
    i2c: rppal::i2c::I2c,
}

#[cfg(feature = "hardware")]
impl RppalBus {
    pub fn new(bus: u8) -> Result<Self, HalError> {
        let i2c = rppal::i2c::I2c::with_bus(bus).map_err(|e| HalError::Bus(e.to_string()))?;
        Ok(Self { i2c })
    }

    fn select(&mut self, addr: u8) -> Result<(), HalError> {
        self.i2c
            .set_slave_address(addr as u16)
            .map_err(|e| HalError::Bus(e.to_string()))
    }
}

#[cfg(feature = "hardware")]
impl I2cBus for RppalBus {
    fn write(&mut self, addr: u8, data: &[u8]) -> Result<(), HalError> {
        self.select(addr)?;
        tracing::trace!("[I2C] 0x{:02X} <- {}", addr, hex::encode(data));
        self.i2c.write(data).map_err(|_| HalError::Nack(addr))?;
        Ok(())
    }

    fn read(&mut self, addr: u8, read_len: usize) -> Result<Vec<u8>, HalError> {
        self.select(addr)?;
        let mut read_buf = vec![0u8; read_len];
        self.i2c.read(&mut read_buf).map_err(|_| HalError::Nack(addr))?;
        tracing::trace!("[I2C] 0x{:02X} -> {}", addr, hex::encode(&read_buf));
        Ok(read_buf)
    }

    fn write_read(&mut self, addr: u8, data: &[u8], read_len: usize) -> Result<Vec<u8>, HalError> {
        self.select(addr)?;
        let mut read_buf = vec![0u8; read_len];
        self.i2c
            .write_read(data, &mut read_buf)
            .map_err(|_| HalError::Nack(addr))?;
        tracing::trace!("[I2C] 0x{:02X} <- {} -> {}", addr, hex::encode(data), hex::encode(&read_buf));
        Ok(read_buf)
    }
}

// ==============================================================================================
// SIMULATED IMPLEMENTATION (For Development Machines And Tests)
// ==============================================================================================
// emulates an SHT4x at 0x44 and a TSL2591 at 0x29 closely enough for the
// drivers: register writes, the id register, crc-protected climate words and
// channel counts that follow the configured gain/integration time. the light
// scene walks through a dark -> bright -> dark profile so auto-ranging has
// something to do.

/// scene brightness in lux, each step held for `SCENE_HOLD` polls
const SCENE_PROFILE: [f64; 8] = [0.05, 0.5, 5.0, 50.0, 200.0, 50.0, 5.0, 0.5];
const SCENE_HOLD: u64 = 15;

pub struct SimulatedBus {
    missing: Vec<u8>,
    sht_pending: Option<u8>,
    sht_polls: u64,
    tsl_enable: u8,
    tsl_control: u8,
    tsl_polls: u64,
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self {
            missing: Vec::new(),
            sht_pending: None,
            sht_polls: 0,
            tsl_enable: 0,
            tsl_control: 0,
            tsl_polls: 0,
        }
    }

    /// stop answering on `addr`, as if the device were unplugged
    pub fn without_device(mut self, addr: u8) -> Self {
        self.missing.push(addr);
        self
    }

    /// last value written to the TSL2591 control register
    pub fn tsl_control(&self) -> u8 {
        self.tsl_control
    }

    fn present(&self, addr: u8) -> Result<(), HalError> {
        if self.missing.contains(&addr) || (addr != sht4x::ADDRESS && addr != tsl2591::ADDRESS) {
            return Err(HalError::Nack(addr));
        }
        Ok(())
    }

    fn sht_words(&mut self, cmd: u8) -> Vec<u8> {
        let (first, second): (u16, u16) = if cmd == sht4x::CMD_READ_SERIAL {
            (0x1A2B, 0x3C4D)
        } else {
            self.sht_polls += 1;
            let phase = self.sht_polls as f64 / 30.0;
            let temperature = 21.5 + 1.5 * phase.sin();
            let humidity = 40.2 + 5.0 * phase.cos();
            (
                ((temperature + 45.0) * 65535.0 / 175.0).round() as u16,
                ((humidity + 6.0) * 65535.0 / 125.0).round() as u16,
            )
        };

        let mut frame = Vec::with_capacity(6);
        for word in [first, second] {
            let bytes = word.to_be_bytes();
            frame.extend_from_slice(&bytes);
            frame.push(sht4x::crc8(&bytes));
        }
        frame
    }

    fn tsl_channels(&mut self) -> Vec<u8> {
        if self.tsl_enable & tsl2591::ENABLE_AEN == 0 {
            return vec![0; 4];
        }
        let scene = SCENE_PROFILE[((self.tsl_polls / SCENE_HOLD) as usize) % SCENE_PROFILE.len()];
        self.tsl_polls += 1;

        let (gain, integration) = tsl2591::decode_control(self.tsl_control);
        let cpl = integration.millis() as f64 * gain.multiplier() / tsl2591::LUX_DF;
        // inverse of the lux formula with a 25% infrared share
        let full = scene * cpl / 0.5625;
        let infrared = full * 0.25;
        let clamp = |v: f64| v.round().min(u16::MAX as f64) as u16;

        let mut frame = Vec::with_capacity(4);
        frame.extend_from_slice(&clamp(full).to_le_bytes());
        frame.extend_from_slice(&clamp(infrared).to_le_bytes());
        frame
    }
}

impl I2cBus for SimulatedBus {
    fn write(&mut self, addr: u8, data: &[u8]) -> Result<(), HalError> {
        self.present(addr)?;
        tracing::trace!("[SIM I2C] 0x{:02X} <- {}", addr, hex::encode(data));
        match (addr, data) {
            (sht4x::ADDRESS, [cmd]) => {
                self.sht_pending = (*cmd != sht4x::CMD_SOFT_RESET).then_some(*cmd);
            }
            (tsl2591::ADDRESS, [cmd, value]) if *cmd == tsl2591::COMMAND_BIT | tsl2591::REG_ENABLE => {
                self.tsl_enable = *value;
            }
            (tsl2591::ADDRESS, [cmd, value]) if *cmd == tsl2591::COMMAND_BIT | tsl2591::REG_CONTROL => {
                self.tsl_control = *value;
            }
            _ => return Err(HalError::Bus(format!("unexpected write to 0x{:02X}", addr))),
        }
        Ok(())
    }

    fn read(&mut self, addr: u8, read_len: usize) -> Result<Vec<u8>, HalError> {
        self.present(addr)?;
        if addr != sht4x::ADDRESS {
            return Err(HalError::Nack(addr));
        }
        // the sht4x nacks reads until a command is in flight
        let cmd = self.sht_pending.take().ok_or(HalError::Nack(addr))?;
        let frame = self.sht_words(cmd);
        tracing::trace!("[SIM I2C] 0x{:02X} -> {}", addr, hex::encode(&frame));
        Ok(frame.into_iter().take(read_len).collect())
    }

    fn write_read(&mut self, addr: u8, data: &[u8], read_len: usize) -> Result<Vec<u8>, HalError> {
        self.present(addr)?;
        let frame = match (addr, data) {
            (tsl2591::ADDRESS, [cmd]) if *cmd == tsl2591::COMMAND_BIT | tsl2591::REG_ID => {
                vec![tsl2591::DEVICE_ID]
            }
            (tsl2591::ADDRESS, [cmd]) if *cmd == tsl2591::COMMAND_BIT | tsl2591::REG_C0DATAL => {
                self.tsl_channels()
            }
            _ => return Err(HalError::Bus(format!("unexpected read from 0x{:02X}", addr))),
        };
        Ok(frame.into_iter().take(read_len).collect())
    }

    fn delay_ms(&mut self, _ms: u64) {}
}
