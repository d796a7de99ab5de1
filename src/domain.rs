use serde::ser::{Serialize, SerializeMap, Serializer};

/// which piece of hardware produced a reading
///
/// the name is what goes into the `"sensor"` field on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// temperature / relative humidity
    Sht4x,
    /// full-spectrum + infrared light
    Tsl2591,
}

impl SensorKind {
    pub fn name(self) -> &'static str {
        match self {
            SensorKind::Sht4x => "SHT4x",
            SensorKind::Tsl2591 => "TSL2591",
        }
    }

    /// light sensors take gain/exposure feedback from their own readings
    pub fn auto_ranges(self) -> bool {
        matches!(self, SensorKind::Tsl2591)
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// what a sensor measured
#[derive(Clone, Debug, PartialEq)]
pub enum Measurement {
    Climate {
        /// degrees celsius
        temperature: f64,
        /// relative humidity (0-100%)
        humidity: f64,
    },
    Light {
        /// channel 0, full spectrum count
        full: u16,
        /// channel 1, infrared count
        infrared: u16,
        /// None when a channel overflowed
        lux: Option<f64>,
    },
}

/// one sensor's measurement at a point in time
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub sensor: SensorKind,
    /// unix timestamp (ms), kept locally, never sent
    pub timestamp_ms: u64,
    pub measurement: Measurement,
}

impl Reading {
    pub fn climate(sensor: SensorKind, temperature: f64, humidity: f64) -> Self {
        Self {
            sensor,
            timestamp_ms: timestamp_ms(),
            measurement: Measurement::Climate { temperature, humidity },
        }
    }

    pub fn light(sensor: SensorKind, full: u16, infrared: u16, lux: Option<f64>) -> Self {
        Self {
            sensor,
            timestamp_ms: timestamp_ms(),
            measurement: Measurement::Light { full, infrared, lux },
        }
    }

    /// visible-light magnitude (full minus infrared) for light readings
    pub fn visible(&self) -> Option<u16> {
        match self.measurement {
            Measurement::Light { full, infrared, .. } => Some(full.saturating_sub(infrared)),
            Measurement::Climate { .. } => None,
        }
    }

    /// metric name/value pairs in wire order
    pub fn metrics(&self) -> Vec<(&'static str, f64)> {
        match self.measurement {
            Measurement::Climate { temperature, humidity } => {
                vec![("temperature", temperature), ("humidity", humidity)]
            }
            Measurement::Light { lux, .. } => lux.map(|lux| ("lux", lux)).into_iter().collect(),
        }
    }

    /// compact json record, e.g. `{"sensor":"SHT4x","temperature":21.5,"humidity":40.2}`
    pub fn to_record(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// the sensor name must lead and metrics keep their order, which a derived
// impl over a map would not guarantee
impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let metrics = self.metrics();
        let mut map = serializer.serialize_map(Some(metrics.len() + 1))?;
        map.serialize_entry("sensor", self.sensor.name())?;
        for (name, value) in &metrics {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// get current timestamp in milliseconds (unix epoch)
pub fn timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
