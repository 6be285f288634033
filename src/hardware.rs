//! Light sensor and backlight adapters.
//!
//! The sysfs adapters talk to an IIO illuminance channel and a
//! backlight-class device. Read and write failures are logged and the last
//! good value is kept, so the brightness loop never sees an error.

use crate::error::HardwareError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Source of raw ambient light readings.
pub trait LightSensor: Send {
    fn read_light(&mut self) -> f64;
}

/// Output stage for the display brightness.
pub trait BrightnessActuator: Send {
    /// Apply a brightness in [0, 1].
    fn set_brightness(&mut self, level: f64);

    /// Brightness currently applied.
    fn brightness(&self) -> f64;
}

fn read_trimmed(path: &Path) -> Result<String, HardwareError> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| HardwareError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_number(path: &Path, value: &str) -> Result<f64, HardwareError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| HardwareError::InvalidValue {
            path: path.to_path_buf(),
            value: value.to_string(),
        })
}

/// IIO light sensor read from a file such as `in_illuminance_raw`.
#[derive(Debug)]
pub struct SysfsLightSensor {
    path: PathBuf,
    last_good: f64,
}

impl SysfsLightSensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_good: 0.0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the sensor once, without the last-good fallback.
    pub fn try_read(&self) -> Result<f64, HardwareError> {
        let raw = read_trimmed(&self.path)?;
        parse_number(&self.path, &raw)
    }
}

impl LightSensor for SysfsLightSensor {
    fn read_light(&mut self) -> f64 {
        match self.try_read() {
            Ok(value) => {
                self.last_good = value;
                value
            }
            Err(e) => {
                warn!("Light sensor read failed: {}, keeping {:.2}", e, self.last_good);
                self.last_good
            }
        }
    }
}

/// Backlight-class device (`brightness` / `max_brightness`).
#[derive(Debug)]
pub struct SysfsBacklight {
    brightness_path: PathBuf,
    max_brightness: u32,
    level: f64,
}

impl SysfsBacklight {
    /// Open the backlight directory, reading `max_brightness` and the
    /// current `brightness` once.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, HardwareError> {
        let dir = dir.as_ref();
        let max_path = dir.join("max_brightness");
        let brightness_path = dir.join("brightness");

        let max_raw = read_trimmed(&max_path)?;
        let max_brightness = max_raw
            .parse::<u32>()
            .ok()
            .filter(|max| *max > 0)
            .ok_or_else(|| HardwareError::InvalidValue {
                path: max_path.clone(),
                value: max_raw.clone(),
            })?;

        let level = match read_trimmed(&brightness_path)
            .and_then(|raw| parse_number(&brightness_path, &raw))
        {
            Ok(raw) => (raw / f64::from(max_brightness)).clamp(0.0, 1.0),
            Err(e) => {
                warn!("Could not read current backlight level: {}", e);
                0.0
            }
        };

        info!(
            "Backlight at {:?} (max_brightness {}, level {:.2})",
            dir, max_brightness, level
        );

        Ok(Self {
            brightness_path,
            max_brightness,
            level,
        })
    }

    #[cfg(test)]
    pub fn max_brightness(&self) -> u32 {
        self.max_brightness
    }

    /// Raw device value for a brightness in [0, 1].
    pub fn raw_value(&self, level: f64) -> u32 {
        (level.clamp(0.0, 1.0) * f64::from(self.max_brightness)).round() as u32
    }

    fn write_raw(&self, raw: u32) -> Result<(), HardwareError> {
        fs::write(&self.brightness_path, raw.to_string()).map_err(|source| {
            HardwareError::WriteFailed {
                path: self.brightness_path.clone(),
                source,
            }
        })
    }
}

impl BrightnessActuator for SysfsBacklight {
    fn set_brightness(&mut self, level: f64) {
        let level = level.clamp(0.0, 1.0);
        match self.write_raw(self.raw_value(level)) {
            Ok(()) => self.level = level,
            Err(e) => warn!("Backlight write failed: {}", e),
        }
    }

    fn brightness(&self) -> f64 {
        self.level
    }
}

/// Fixed light level for hosts without a sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedLightSensor {
    pub light: f64,
}

impl SimulatedLightSensor {
    pub fn new(light: f64) -> Self {
        Self { light }
    }
}

impl LightSensor for SimulatedLightSensor {
    fn read_light(&mut self) -> f64 {
        self.light
    }
}

/// Backlight that only remembers and logs what it was given.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimulatedBacklight {
    level: f64,
}

impl SimulatedBacklight {
    #[cfg(test)]
    pub fn new(level: f64) -> Self {
        Self {
            level: level.clamp(0.0, 1.0),
        }
    }
}

impl BrightnessActuator for SimulatedBacklight {
    fn set_brightness(&mut self, level: f64) {
        let level = level.clamp(0.0, 1.0);
        if (level - self.level).abs() > f64::EPSILON {
            debug!("Simulated backlight {:.3}", level);
        }
        self.level = level;
    }

    fn brightness(&self) -> f64 {
        self.level
    }
}
