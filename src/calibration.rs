//! Light-to-brightness calibration.
//!
//! Two hardware revisions of the clock ship with different sensor windows
//! and different usable brightness ranges, so the mapping is data, not code.

use serde::{Deserialize, Serialize};

/// Calibration bounds for the auto-brightness map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Averaged light at or below which the display sits at `min_brightness`
    pub min_light: f64,
    /// Averaged light at or above which the display sits at `max_brightness`
    pub max_light: f64,
    pub min_brightness: f64,
    pub max_brightness: f64,
}

impl Calibration {
    /// First hardware revision: sensor window 15..21, brightness 0.06..0.31.
    pub const REV1: Calibration = Calibration {
        min_light: 15.0,
        max_light: 21.0,
        min_brightness: 0.06,
        max_brightness: 0.31,
    };

    /// Second hardware revision: sensor window 14..19, brightness 0.06..0.36.
    pub const REV2: Calibration = Calibration {
        min_light: 14.0,
        max_light: 19.0,
        min_brightness: 0.06,
        max_brightness: 0.36,
    };
}

impl Default for Calibration {
    fn default() -> Self {
        Self::REV1
    }
}

/// Named calibration presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationPreset {
    #[default]
    Rev1,
    Rev2,
}

impl CalibrationPreset {
    pub fn calibration(self) -> Calibration {
        match self {
            CalibrationPreset::Rev1 => Calibration::REV1,
            CalibrationPreset::Rev2 => Calibration::REV2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CalibrationPreset::Rev1 => "rev1",
            CalibrationPreset::Rev2 => "rev2",
        }
    }
}

impl Serialize for CalibrationPreset {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CalibrationPreset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "rev1" => Ok(CalibrationPreset::Rev1),
            "rev2" => Ok(CalibrationPreset::Rev2),
            _ => Err(serde::de::Error::custom(format!(
                "invalid calibration preset: {}, expected one of: rev1, rev2",
                s
            ))),
        }
    }
}

/// Calibration as written in the config file: a preset name or explicit bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CalibrationSetting {
    Preset(CalibrationPreset),
    Custom(Calibration),
}

impl CalibrationSetting {
    pub fn resolve(&self) -> Calibration {
        match self {
            CalibrationSetting::Preset(preset) => preset.calibration(),
            CalibrationSetting::Custom(calibration) => *calibration,
        }
    }
}

impl Default for CalibrationSetting {
    fn default() -> Self {
        CalibrationSetting::Preset(CalibrationPreset::default())
    }
}

/// Brightness mode: follow the sensor or hold a user level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrightnessMode {
    #[default]
    Auto,
    Manual,
}

impl BrightnessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BrightnessMode::Auto => "auto",
            BrightnessMode::Manual => "manual",
        }
    }
}

/// Maps an averaged light reading or a manual level to a brightness in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetBrightnessCalculator {
    calibration: Calibration,
}

impl TargetBrightnessCalculator {
    pub fn new(calibration: Calibration) -> Self {
        Self { calibration }
    }

    /// Compute the target brightness for the given mode.
    pub fn compute_target(&self, mode: BrightnessMode, manual_level: u8, averaged_light: f64) -> f64 {
        match mode {
            BrightnessMode::Manual => level_to_brightness(manual_level),
            BrightnessMode::Auto => self.from_light(averaged_light),
        }
    }

    /// Clamped linear interpolation of `light` across the calibration window.
    pub fn from_light(&self, light: f64) -> f64 {
        let Calibration {
            min_light,
            max_light,
            min_brightness,
            max_brightness,
        } = self.calibration;

        let target = if light <= min_light {
            min_brightness
        } else if light >= max_light {
            max_brightness
        } else {
            let position = (light - min_light) / (max_light - min_light);
            min_brightness + position * (max_brightness - min_brightness)
        };

        target.clamp(0.0, 1.0)
    }
}

impl Default for TargetBrightnessCalculator {
    fn default() -> Self {
        Self::new(Calibration::default())
    }
}

/// Manual level (0-100) as a brightness in [0, 1].
pub fn level_to_brightness(level: u8) -> f64 {
    (f64::from(level) / 100.0).clamp(0.0, 1.0)
}
