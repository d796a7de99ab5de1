//! ==============================================================================
//! sampler.rs - fixed-rate sensor sampling task
//! ==============================================================================
//!
//! purpose:
//!     polls every enabled sensor once per cycle, runs light readings through
//!     auto-ranging, and appends the serialized records to the shared buffer.
//!
//! relationships:
//!     - owns: the sensors and their auto-range state (nobody else touches them)
//!     - writes: buffer.rs (one append per record)
//!     - spawned by: node.rs
//!
//! cycle:
//!
//! ```text
//!     for each sensor ──► poll ──► ok? ──► light? ──► auto-range ──► configure
//!                                   │                                 (next poll)
//!                                   ▼
//!                              serialize ──► append
//! ```
//!
//! errors:
//!     a failed poll is skipped; the next cycle tries again. a failed
//!     reconfigure keeps the previous level so the next cycle retries the step.
//!
//! ==============================================================================

use crate::autorange::{AutoRangeController, SensitivityLevel};
use crate::buffer::SharedBuffer;
use crate::domain::{Measurement, Reading, SensorKind};
use crate::sensor::Sensor;

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

struct SensorSlot {
    sensor: Box<dyn Sensor>,
    ranging: Option<AutoRangeController>,
}

pub struct SamplerTask {
    slots: Vec<SensorSlot>,
    buffer: SharedBuffer,
    interval: Duration,
    show_data: bool,
}

impl SamplerTask {
    /// sensors must already have been started with `begin`
    pub fn new(sensors: Vec<Box<dyn Sensor>>, buffer: SharedBuffer, interval: Duration) -> Self {
        let slots = sensors
            .into_iter()
            .map(|sensor| {
                let ranging = sensor.kind().auto_ranges().then(AutoRangeController::new);
                SensorSlot { sensor, ranging }
            })
            .collect();
        Self { slots, buffer, interval, show_data: false }
    }

    /// log every reading at info instead of debug
    pub fn show_data(mut self, show: bool) -> Self {
        self.show_data = show;
        self
    }

    /// current sensitivity of each auto-ranging sensor
    pub fn sensitivity(&self) -> Vec<(SensorKind, SensitivityLevel)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.ranging.as_ref().map(|r| (slot.sensor.kind(), r.level())))
            .collect()
    }

    /// runs one sampling cycle, returns how many records were appended
    pub fn sample_once(&mut self) -> usize {
        let mut appended = 0;
        for slot in &mut self.slots {
            let kind = slot.sensor.kind();
            let reading = match slot.sensor.poll() {
                Ok(reading) => reading,
                Err(e) => {
                    tracing::warn!(sensor = %kind, "read error, skipping this cycle: {}", e);
                    continue;
                }
            };
            log_reading(&reading, self.show_data);

            if let (Some(ranging), Some(visible)) = (slot.ranging.as_mut(), reading.visible()) {
                if let Some(level) = ranging.propose(visible).changed_to() {
                    match slot.sensor.configure(level) {
                        Ok(()) => ranging.commit(level),
                        Err(e) => tracing::warn!(
                            sensor = %kind,
                            level = level.get(),
                            "failed to apply sensitivity, staying at {}: {}",
                            ranging.level(),
                            e
                        ),
                    }
                }
            }

            if reading.metrics().is_empty() {
                tracing::warn!(sensor = %kind, "channel overflow, no value this cycle");
                continue;
            }
            match reading.to_record() {
                Ok(record) => {
                    self.buffer.append(&record);
                    appended += 1;
                }
                Err(e) => tracing::warn!(sensor = %kind, "failed to serialize reading: {}", e),
            }
        }
        appended
    }

    /// samples forever at the configured interval
    ///
    /// bus transactions block, so each cycle runs on the blocking pool and
    /// hands the task state back when it is done.
    pub async fn run(self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_ms = self.interval.as_millis() as u64, sensors = self.slots.len(), "sampler started");

        let mut sampler = self;
        loop {
            ticker.tick().await;
            sampler = tokio::task::spawn_blocking(move || {
                sampler.sample_once();
                sampler
            })
            .await
            .context("sampling cycle panicked")?;
        }
    }
}

fn log_reading(reading: &Reading, show_data: bool) {
    let line = match reading.measurement {
        Measurement::Climate { temperature, humidity } => {
            format!("Temp: {:.2}°C | Humidity: {:.2}%", temperature, humidity)
        }
        Measurement::Light { full, infrared, lux } => match lux {
            Some(lux) => format!("Lux: {:.2} | Full: {} | IR: {}", lux, full, infrared),
            None => format!("Lux: overflow | Full: {} | IR: {}", full, infrared),
        },
    };
    if show_data {
        tracing::info!("[{}] {}", reading.sensor, line);
    } else {
        tracing::debug!("[{}] {}", reading.sensor, line);
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// replays canned poll results and records configure calls
    struct Scripted {
        kind: SensorKind,
        polls: VecDeque<Result<Reading, SensorError>>,
        configured: Arc<Mutex<Vec<u8>>>,
        failing_configures: usize,
    }

    impl Scripted {
        fn new(kind: SensorKind, polls: Vec<Result<Reading, SensorError>>) -> (Self, Arc<Mutex<Vec<u8>>>) {
            let configured = Arc::new(Mutex::new(Vec::new()));
            let sensor = Self { kind, polls: polls.into(), configured: configured.clone(), failing_configures: 0 };
            (sensor, configured)
        }
    }

    impl Sensor for Scripted {
        fn kind(&self) -> SensorKind {
            self.kind
        }

        fn begin(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        fn configure(&mut self, level: SensitivityLevel) -> Result<(), SensorError> {
            if self.failing_configures > 0 {
                self.failing_configures -= 1;
                return Err(SensorError::InvalidData("control write lost".to_string()));
            }
            self.configured.lock().unwrap().push(level.get());
            Ok(())
        }

        fn poll(&mut self) -> Result<Reading, SensorError> {
            self.polls.pop_front().unwrap_or(Err(SensorError::NoData))
        }
    }

    fn light(full: u16, infrared: u16, lux: Option<f64>) -> Result<Reading, SensorError> {
        Ok(Reading::light(SensorKind::Tsl2591, full, infrared, lux))
    }

    #[test]
    fn test_failed_poll_is_skipped() {
        let buffer = SharedBuffer::new();
        let (climate, _) = Scripted::new(
            SensorKind::Sht4x,
            vec![Err(SensorError::NoData), Ok(Reading::climate(SensorKind::Sht4x, 20.0, 50.0))],
        );
        let mut sampler = SamplerTask::new(vec![Box::new(climate)], buffer.clone(), Duration::from_secs(1));

        assert_eq!(sampler.sample_once(), 0);
        assert_eq!(buffer.pending(), 0);

        assert_eq!(sampler.sample_once(), 1);
        assert_eq!(
            buffer.drain().as_str(),
            r#"{"sensor":"SHT4x","temperature":20.0,"humidity":50.0}"#
        );
    }

    #[test]
    fn test_dim_light_raises_sensitivity_for_next_poll() {
        let buffer = SharedBuffer::new();
        let (sensor, configured) = Scripted::new(SensorKind::Tsl2591, vec![light(20, 12, Some(0.5))]);
        let mut sampler = SamplerTask::new(vec![Box::new(sensor)], buffer.clone(), Duration::from_secs(1));

        sampler.sample_once();
        assert_eq!(*configured.lock().unwrap(), vec![3]);
        assert_eq!(sampler.sensitivity(), vec![(SensorKind::Tsl2591, SensitivityLevel::new(3).unwrap())]);
        assert_eq!(buffer.drain().as_str(), r#"{"sensor":"TSL2591","lux":0.5}"#);
    }

    #[test]
    fn test_failed_configure_keeps_controller_with_hardware() {
        let (mut sensor, configured) = Scripted::new(SensorKind::Tsl2591, (0..2).map(|_| light(20, 15, Some(0.2))).collect());
        sensor.failing_configures = 1;
        let mut sampler = SamplerTask::new(vec![Box::new(sensor)], SharedBuffer::new(), Duration::from_secs(1));

        // the step is not taken while the chip still runs the old settings
        sampler.sample_once();
        assert!(configured.lock().unwrap().is_empty());
        assert_eq!(sampler.sensitivity()[0].1, SensitivityLevel::DEFAULT);

        // still dim: the same step is retried and sticks this time
        sampler.sample_once();
        assert_eq!(*configured.lock().unwrap(), vec![3]);
        assert_eq!(sampler.sensitivity()[0].1.get(), 3);
    }

    #[test]
    fn test_failed_configure_at_top_step_is_retried() {
        let (mut sensor, configured) = Scripted::new(SensorKind::Tsl2591, (0..3).map(|_| light(6, 1, Some(0.01))).collect());
        sensor.failing_configures = 1;
        let mut sampler = SamplerTask::new(vec![Box::new(sensor)], SharedBuffer::new(), Duration::from_secs(1));
        sampler.slots[0].ranging = Some(AutoRangeController::with_level(SensitivityLevel::new(4).unwrap()));

        sampler.sample_once();
        assert_eq!(sampler.sensitivity()[0].1.get(), 4);
        sampler.sample_once();
        assert_eq!(sampler.sensitivity()[0].1, SensitivityLevel::MAX);
        sampler.sample_once();
        assert_eq!(*configured.lock().unwrap(), vec![5]);
    }

    #[test]
    fn test_in_range_light_leaves_sensor_alone() {
        let (sensor, configured) = Scripted::new(SensorKind::Tsl2591, vec![light(80, 20, Some(3.0))]);
        let mut sampler = SamplerTask::new(vec![Box::new(sensor)], SharedBuffer::new(), Duration::from_secs(1));

        sampler.sample_once();
        assert!(configured.lock().unwrap().is_empty());
        assert_eq!(sampler.sensitivity()[0].1, SensitivityLevel::DEFAULT);
    }

    #[test]
    fn test_overflow_still_feeds_auto_range() {
        let buffer = SharedBuffer::new();
        let (sensor, configured) = Scripted::new(SensorKind::Tsl2591, vec![light(0xFFFF, 0x2000, None)]);
        let mut sampler = SamplerTask::new(vec![Box::new(sensor)], buffer.clone(), Duration::from_secs(1));

        assert_eq!(sampler.sample_once(), 0);
        assert_eq!(*configured.lock().unwrap(), vec![1]);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_climate_sensor_has_no_ranging() {
        let (climate, configured) = Scripted::new(SensorKind::Sht4x, vec![]);
        let sampler = SamplerTask::new(vec![Box::new(climate)], SharedBuffer::new(), Duration::from_secs(1));
        assert!(sampler.sensitivity().is_empty());
        assert!(configured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_samples_on_its_interval() {
        let buffer = SharedBuffer::new();
        let readings = (0..100).map(|_| Ok(Reading::climate(SensorKind::Sht4x, 1.0, 2.0))).collect();
        let (climate, _) = Scripted::new(SensorKind::Sht4x, readings);
        let sampler = SamplerTask::new(vec![Box::new(climate)], buffer.clone(), Duration::from_millis(20));

        let task = tokio::spawn(sampler.run());
        tokio::time::sleep(Duration::from_millis(150)).await;
        task.abort();

        // the first tick fires immediately, then roughly every 20ms
        assert!(buffer.pending() >= 2, "pending {}", buffer.pending());
    }
}
