//! Configuration module for the daemon.
//!
//! This module handles loading, saving, and validating daemon configuration.

use crate::brightness::{BrightnessTuning, DEFAULT_MANUAL_LEVEL};
use crate::calibration::{BrightnessMode, CalibrationSetting};
use crate::debounce::DEFAULT_REFRACTORY;
use crate::error::ConfigError;
use crate::hysteresis::{DEFAULT_DWELL, DEFAULT_EPSILON};
use crate::ipc_server::DEFAULT_SOCKET_PATH;
use crate::light_sampler::DEFAULT_LIGHT_SAMPLES;
use crate::mode_machine::DEFAULT_QUIET_PERIOD;
use crate::ramp::DEFAULT_STEP;
use crate::renderer::DEFAULT_FRAME_INTERVAL;
use crate::settings::JsonSettingsStore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "UNICORN_CLOCK_CONFIG";

/// Where the light sensor and backlight live.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HardwareConfig {
    /// IIO illuminance file; simulated sensor when unset
    pub light_sensor_path: Option<PathBuf>,
    /// Backlight class directory; simulated backlight when unset
    pub backlight_path: Option<PathBuf>,
    /// Reading returned by the simulated sensor
    pub simulated_light: f64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            light_sensor_path: None,
            backlight_path: None,
            simulated_light: 18.0,
        }
    }
}

/// Daemon configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub brightness_mode: BrightnessMode,
    pub manual_level: u8,
    pub calibration: CalibrationSetting,
    pub light_samples: usize,
    pub hysteresis: bool,
    pub target_epsilon: f64,
    pub dwell_ms: u64,
    pub ramp_step: f64,
    pub auto_poll_ms: u64,
    pub manual_poll_ms: u64,
    pub input_poll_ms: u64,
    pub debounce_ms: u64,
    pub quiet_period_ms: u64,
    pub frame_interval_ms: u64,
    pub settings_path: Option<PathBuf>,
    pub socket_path: String,
    pub hardware: HardwareConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            brightness_mode: BrightnessMode::Auto,
            manual_level: DEFAULT_MANUAL_LEVEL,
            calibration: CalibrationSetting::default(),
            light_samples: DEFAULT_LIGHT_SAMPLES,
            hysteresis: true,
            target_epsilon: DEFAULT_EPSILON,
            dwell_ms: DEFAULT_DWELL.as_millis() as u64,
            ramp_step: DEFAULT_STEP,
            auto_poll_ms: 500,
            manual_poll_ms: 1000,
            input_poll_ms: 250,
            debounce_ms: DEFAULT_REFRACTORY.as_millis() as u64,
            quiet_period_ms: DEFAULT_QUIET_PERIOD.as_millis() as u64,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL.as_millis() as u64,
            settings_path: None,
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            hardware: HardwareConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values.
    /// Returns Ok(()) if valid, Err with descriptive message if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.manual_level > 100 {
            return Err(ConfigError::ValidationError(format!(
                "manual_level ({}) must not exceed 100",
                self.manual_level
            )));
        }

        let cal = self.calibration.resolve();
        if !(cal.min_light < cal.max_light) {
            return Err(ConfigError::ValidationError(format!(
                "min_light ({}) must be below max_light ({})",
                cal.min_light, cal.max_light
            )));
        }

        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(cal.min_brightness) || !in_unit(cal.max_brightness) {
            return Err(ConfigError::ValidationError(format!(
                "brightness bounds ({}, {}) must lie within [0, 1]",
                cal.min_brightness, cal.max_brightness
            )));
        }

        if cal.min_brightness > cal.max_brightness {
            return Err(ConfigError::ValidationError(format!(
                "min_brightness ({}) cannot be greater than max_brightness ({})",
                cal.min_brightness, cal.max_brightness
            )));
        }

        if self.light_samples == 0 {
            return Err(ConfigError::ValidationError(
                "light_samples must be at least 1".to_string(),
            ));
        }

        if !(self.target_epsilon > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "target_epsilon ({}) must be positive",
                self.target_epsilon
            )));
        }

        if !(self.ramp_step > 0.0 && self.ramp_step <= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "ramp_step ({}) must be in (0, 1]",
                self.ramp_step
            )));
        }

        let intervals = [
            ("auto_poll_ms", self.auto_poll_ms),
            ("manual_poll_ms", self.manual_poll_ms),
            ("input_poll_ms", self.input_poll_ms),
            ("frame_interval_ms", self.frame_interval_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be greater than zero",
                name
            )));
        }

        Ok(())
    }

    /// Brightness pipeline tuning derived from this config.
    pub fn tuning(&self) -> BrightnessTuning {
        BrightnessTuning {
            calibration: self.calibration.resolve(),
            light_samples: self.light_samples,
            hysteresis: self.hysteresis,
            epsilon: self.target_epsilon,
            dwell: Duration::from_millis(self.dwell_ms),
            ramp_step: self.ramp_step,
        }
    }

    /// Brightness loop period for a mode.
    pub fn poll_interval(&self, mode: BrightnessMode) -> Duration {
        match mode {
            BrightnessMode::Auto => Duration::from_millis(self.auto_poll_ms),
            BrightnessMode::Manual => Duration::from_millis(self.manual_poll_ms),
        }
    }

    pub fn input_poll(&self) -> Duration {
        Duration::from_millis(self.input_poll_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Settings file location, falling back to the data directory.
    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(JsonSettingsStore::default_path)
    }
}

/// Configuration manager with file I/O.
pub struct ConfigManager {
    config: RwLock<Config>,
    path: PathBuf,
}

impl ConfigManager {
    /// Load configuration from file or use defaults.
    /// If the file doesn't exist, returns a manager with default config.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| {
                ConfigError::ParseError(format!("Failed to read config file: {}", e))
            })?;

            let config: Config = serde_json::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(format!("Invalid JSON: {}", e)))?;

            config.validate()?;
            config
        } else {
            Config::default()
        };

        Ok(Self {
            config: RwLock::new(config),
            path: path.to_path_buf(),
        })
    }

    /// Save configuration to file using atomic write.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config = self.config.read().map_err(|_| {
            ConfigError::ValidationError("Failed to acquire read lock".to_string())
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&*config)
            .map_err(|e| ConfigError::ParseError(format!("Failed to serialize config: {}", e)))?;

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Get current configuration.
    pub fn get(&self) -> Config {
        self.config
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|_| Config::default())
    }

    /// Update configuration with validation, then persist it.
    pub fn update(&self, config: Config) -> Result<(), ConfigError> {
        config.validate()?;

        let mut current = self.config.write().map_err(|_| {
            ConfigError::ValidationError("Failed to acquire write lock".to_string())
        })?;
        *current = config;
        drop(current);

        self.save()
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Config path: `$UNICORN_CLOCK_CONFIG`, else
    /// `<config dir>/unicorn-clock/config.json`.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("unicorn-clock")
            .join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{Calibration, CalibrationPreset};
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.brightness_mode, BrightnessMode::Auto);
        assert_eq!(config.manual_level, 50);
        assert_eq!(config.calibration.resolve(), Calibration::REV1);
        assert_eq!(config.poll_interval(BrightnessMode::Auto), Duration::from_millis(500));
        assert_eq!(config.poll_interval(BrightnessMode::Manual), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_manager_load_nonexistent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nonexistent.json");

        let manager = ConfigManager::load_or_default(&path).unwrap();
        assert_eq!(manager.get(), Config::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"brightness_mode":"manual","calibration":"rev2","hardware":{"simulated_light":3.0}}"#,
        )
        .unwrap();

        let config = ConfigManager::load_or_default(&path).unwrap().get();
        assert_eq!(config.brightness_mode, BrightnessMode::Manual);
        assert_eq!(config.calibration.resolve(), Calibration::REV2);
        assert_eq!(config.hardware.simulated_light, 3.0);
        assert_eq!(config.hardware.backlight_path, None);
        assert_eq!(config.debounce_ms, 200);
    }

    #[test]
    fn test_custom_calibration_object() {
        let json = r#"{"calibration":{"min_light":10,"max_light":30,"min_brightness":0.1,"max_brightness":0.9}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let cal = config.tuning().calibration;
        assert_eq!(cal.min_light, 10.0);
        assert_eq!(cal.max_brightness, 0.9);
    }

    #[test]
    fn test_config_manager_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let manager = ConfigManager::load_or_default(&path).unwrap();
        let mut config = manager.get();
        config.manual_level = 80;
        config.calibration = CalibrationSetting::Preset(CalibrationPreset::Rev2);
        config.hysteresis = false;
        manager.update(config.clone()).unwrap();

        let loaded = ConfigManager::load_or_default(&path).unwrap().get();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{").unwrap();

        assert!(matches!(
            ConfigManager::load_or_default(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_invalid_preset_name() {
        let result: Result<Config, _> = serde_json::from_str(r#"{"calibration":"rev9"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejections() {
        let cases: Vec<(&str, Box<dyn Fn(&mut Config)>)> = vec![
            ("manual_level", Box::new(|c: &mut Config| c.manual_level = 101)),
            (
                "max_light",
                Box::new(|c: &mut Config| {
                    c.calibration = CalibrationSetting::Custom(Calibration {
                        min_light: 20.0,
                        max_light: 20.0,
                        ..Calibration::REV1
                    })
                }),
            ),
            (
                "[0, 1]",
                Box::new(|c: &mut Config| {
                    c.calibration = CalibrationSetting::Custom(Calibration {
                        max_brightness: 1.2,
                        ..Calibration::REV1
                    })
                }),
            ),
            (
                "cannot be greater",
                Box::new(|c: &mut Config| {
                    c.calibration = CalibrationSetting::Custom(Calibration {
                        min_brightness: 0.5,
                        max_brightness: 0.4,
                        ..Calibration::REV1
                    })
                }),
            ),
            ("light_samples", Box::new(|c: &mut Config| c.light_samples = 0)),
            ("target_epsilon", Box::new(|c: &mut Config| c.target_epsilon = 0.0)),
            ("ramp_step", Box::new(|c: &mut Config| c.ramp_step = 1.5)),
            ("ramp_step", Box::new(|c: &mut Config| c.ramp_step = -0.1)),
            ("input_poll_ms", Box::new(|c: &mut Config| c.input_poll_ms = 0)),
            ("frame_interval_ms", Box::new(|c: &mut Config| c.frame_interval_ms = 0)),
        ];

        for (needle, mutate) in cases {
            let mut config = Config::default();
            mutate(&mut config);
            match config.validate() {
                Err(ConfigError::ValidationError(msg)) => {
                    assert!(msg.contains(needle), "{} not in {}", needle, msg)
                }
                other => panic!("expected rejection for {}, got {:?}", needle, other),
            }
        }
    }

    #[test]
    fn test_tuning_carries_durations() {
        let config = Config {
            dwell_ms: 1500,
            light_samples: 1,
            ..Config::default()
        };
        let tuning = config.tuning();
        assert_eq!(tuning.dwell, Duration::from_millis(1500));
        assert_eq!(tuning.light_samples, 1);
    }

    fn valid_config_strategy() -> impl Strategy<Value = Config> {
        (
            0u8..=100,
            prop_oneof![Just(BrightnessMode::Auto), Just(BrightnessMode::Manual)],
            1usize..10,
            any::<bool>(),
            1u64..5000,
            (1u32..=50).prop_map(|n| f64::from(n) / 100.0),
        )
            .prop_map(|(manual_level, brightness_mode, light_samples, hysteresis, dwell_ms, ramp_step)| {
                Config {
                    brightness_mode,
                    manual_level,
                    light_samples,
                    hysteresis,
                    dwell_ms,
                    ramp_step,
                    ..Config::default()
                }
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_config_file_round_trip(config in valid_config_strategy()) {
            prop_assert!(config.validate().is_ok());

            let dir = tempdir().unwrap();
            let path = dir.path().join("config.json");

            let manager = ConfigManager::load_or_default(&path).unwrap();
            manager.update(config.clone()).unwrap();

            let loaded = ConfigManager::load_or_default(&path).unwrap().get();
            prop_assert_eq!(config, loaded);
        }
    }
}
