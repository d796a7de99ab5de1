//! ==============================================================================
//! autorange.rs - light sensor auto-ranging
//! ==============================================================================
//!
//! purpose:
//!     keeps the tsl2591 inside its useful range. after every poll the
//!     visible-light count is checked against two thresholds and the
//!     sensitivity level moves one step toward a better exposure. the new
//!     gain/integration pair applies to the next poll, not the one just taken.
//!
//! levels:
//!
//! ```text
//!     level │ gain   │ integration
//!     ──────┼────────┼────────────
//!       0   │ low    │ 100 ms
//!       1   │ medium │ 100 ms
//!       2   │ high   │ 200 ms      <- start
//!       3   │ max    │ 200 ms
//!       4   │ max    │ 400 ms
//!       5   │ max    │ 600 ms
//! ```
//!
//! notes:
//!     the start level sits in the middle of the ordinals, but on the chip it
//!     is already high gain with a 200 ms exposure (the firmware's table).
//!     one step per cycle only; a reading that flips between the thresholds
//!     will make the level oscillate, there is no hysteresis band.
//!
//! ==============================================================================

/// visible counts below this are under-lit
pub const DIM_THRESHOLD: u16 = 10;
/// visible counts above this are over-lit
pub const BRIGHT_THRESHOLD: u16 = 100;

/// analog gain of the light sensor
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Gain {
    Low,
    Medium,
    High,
    Max,
}

impl Gain {
    /// nominal amplification used by the lux formula
    pub fn multiplier(self) -> f64 {
        match self {
            Gain::Low => 1.0,
            Gain::Medium => 25.0,
            Gain::High => 428.0,
            Gain::Max => 9876.0,
        }
    }
}

/// ADC integration (exposure) time
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum IntegrationTime {
    Ms100,
    Ms200,
    Ms300,
    Ms400,
    Ms500,
    Ms600,
}

impl IntegrationTime {
    pub fn millis(self) -> u64 {
        match self {
            IntegrationTime::Ms100 => 100,
            IntegrationTime::Ms200 => 200,
            IntegrationTime::Ms300 => 300,
            IntegrationTime::Ms400 => 400,
            IntegrationTime::Ms500 => 500,
            IntegrationTime::Ms600 => 600,
        }
    }
}

/// ordinal in `[0, 5]` selecting a gain/integration pair
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SensitivityLevel(u8);

impl SensitivityLevel {
    pub const MIN: SensitivityLevel = SensitivityLevel(0);
    pub const MAX: SensitivityLevel = SensitivityLevel(5);
    pub const DEFAULT: SensitivityLevel = SensitivityLevel(2);

    /// None if `level` is out of range
    pub fn new(level: u8) -> Option<Self> {
        (level <= Self::MAX.0).then_some(SensitivityLevel(level))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn raised(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }

    pub fn lowered(self) -> Option<Self> {
        self.0.checked_sub(1).map(SensitivityLevel)
    }

    pub fn settings(self) -> (Gain, IntegrationTime) {
        match self.0 {
            0 => (Gain::Low, IntegrationTime::Ms100),
            1 => (Gain::Medium, IntegrationTime::Ms100),
            2 => (Gain::High, IntegrationTime::Ms200),
            3 => (Gain::Max, IntegrationTime::Ms200),
            4 => (Gain::Max, IntegrationTime::Ms400),
            _ => (Gain::Max, IntegrationTime::Ms600),
        }
    }
}

impl Default for SensitivityLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for SensitivityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// result of one controller step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Adjustment {
    Unchanged,
    Raised(SensitivityLevel),
    Lowered(SensitivityLevel),
}

impl Adjustment {
    /// the level to reconfigure the sensor to, if any
    pub fn changed_to(self) -> Option<SensitivityLevel> {
        match self {
            Adjustment::Unchanged => None,
            Adjustment::Raised(level) | Adjustment::Lowered(level) => Some(level),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AutoRangeController {
    level: SensitivityLevel,
}

impl AutoRangeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(level: SensitivityLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> SensitivityLevel {
        self.level
    }

    /// feeds one visible-light magnitude and moves at most one step
    pub fn update(&mut self, visible: u16) -> Adjustment {
        let adjustment = self.propose(visible);
        if let Some(level) = adjustment.changed_to() {
            self.commit(level);
        }
        adjustment
    }

    /// the step `visible` calls for, without moving the level
    ///
    /// pair with `commit` once the sensor has actually taken the new
    /// settings, so the controller never runs ahead of the hardware.
    pub fn propose(&self, visible: u16) -> Adjustment {
        tracing::debug!(visible, level = self.level.get(), "auto-range input");

        if visible < DIM_THRESHOLD {
            self.level.raised().map_or(Adjustment::Unchanged, Adjustment::Raised)
        } else if visible > BRIGHT_THRESHOLD {
            self.level.lowered().map_or(Adjustment::Unchanged, Adjustment::Lowered)
        } else {
            Adjustment::Unchanged
        }
    }

    /// moves to `level`, which the sensor is now configured for
    pub fn commit(&mut self, level: SensitivityLevel) {
        let (gain, integration) = level.settings();
        tracing::info!(
            level = level.get(),
            ?gain,
            integration_ms = integration.millis(),
            "adjusting light sensor sensitivity"
        );
        self.level = level;
    }
}
