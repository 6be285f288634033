//! Adaptive brightness controller.
//!
//! Composes the sampling, calibration, hysteresis and ramp stages into one
//! per-tick update, and holds the scalar brightness intent that button
//! handlers write from input context.

use crate::calibration::{BrightnessMode, Calibration, TargetBrightnessCalculator};
use crate::hysteresis::HysteresisStabilizer;
use crate::light_sampler::AmbientLightSampler;
use crate::ramp::SmoothingRamp;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Level change applied by one brightness button press.
pub const BRIGHTNESS_STEP: i16 = 5;

/// Default manual level at first boot.
pub const DEFAULT_MANUAL_LEVEL: u8 = 50;

/// Tuning knobs for the brightness pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessTuning {
    pub calibration: Calibration,
    pub light_samples: usize,
    pub hysteresis: bool,
    pub epsilon: f64,
    pub dwell: Duration,
    pub ramp_step: f64,
}

impl Default for BrightnessTuning {
    fn default() -> Self {
        Self {
            calibration: Calibration::default(),
            light_samples: crate::light_sampler::DEFAULT_LIGHT_SAMPLES,
            hysteresis: true,
            epsilon: crate::hysteresis::DEFAULT_EPSILON,
            dwell: crate::hysteresis::DEFAULT_DWELL,
            ramp_step: crate::ramp::DEFAULT_STEP,
        }
    }
}

/// Brightness mode and manual level as written by the button handlers.
///
/// Plain scalar atomics: handlers never block and the brightness loop reads
/// whichever value was written last.
#[derive(Debug)]
pub struct BrightnessIntent {
    auto: AtomicBool,
    manual_level: AtomicU8,
}

impl BrightnessIntent {
    pub fn new(mode: BrightnessMode, manual_level: u8) -> Self {
        Self {
            auto: AtomicBool::new(mode == BrightnessMode::Auto),
            manual_level: AtomicU8::new(manual_level.min(100)),
        }
    }

    pub fn mode(&self) -> BrightnessMode {
        if self.auto.load(Ordering::SeqCst) {
            BrightnessMode::Auto
        } else {
            BrightnessMode::Manual
        }
    }

    pub fn is_auto(&self) -> bool {
        self.mode() == BrightnessMode::Auto
    }

    pub fn set_mode(&self, mode: BrightnessMode) {
        self.auto.store(mode == BrightnessMode::Auto, Ordering::SeqCst);
    }

    /// Flip between auto and manual, returning the new mode.
    pub fn toggle_mode(&self) -> BrightnessMode {
        let was_auto = self.auto.fetch_xor(true, Ordering::SeqCst);
        let mode = if was_auto {
            BrightnessMode::Manual
        } else {
            BrightnessMode::Auto
        };
        info!(
            "Auto brightness {}",
            if mode == BrightnessMode::Auto { "enabled" } else { "disabled" }
        );
        mode
    }

    pub fn manual_level(&self) -> u8 {
        self.manual_level.load(Ordering::SeqCst)
    }

    /// Shift the manual level by `delta`, clamped to 0-100.
    ///
    /// Returns the new level, or `None` when auto brightness is on and the
    /// buttons are disabled.
    pub fn adjust(&self, delta: i16) -> Option<u8> {
        if self.is_auto() {
            info!("Brightness buttons disabled while auto brightness is enabled");
            return None;
        }

        let previous = self
            .manual_level
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |level| {
                Some((i16::from(level) + delta).clamp(0, 100) as u8)
            })
            .unwrap_or_else(|level| level);
        Some((i16::from(previous) + delta).clamp(0, 100) as u8)
    }
}

/// Brightness status exported over the control socket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrightnessStatus {
    pub mode: BrightnessMode,
    /// Manual level in manual mode, computed target in auto mode
    pub level: f64,
    pub current: f64,
    pub target: f64,
}

/// Owns the brightness state for the process lifetime.
#[derive(Debug, Clone)]
pub struct BrightnessController {
    mode: BrightnessMode,
    manual_level: u8,
    current: f64,
    last_candidate: f64,
    hysteresis_enabled: bool,
    sampler: AmbientLightSampler,
    calculator: TargetBrightnessCalculator,
    stabilizer: HysteresisStabilizer,
    ramp: SmoothingRamp,
}

impl BrightnessController {
    /// Create the controller from the actuator's current brightness and an
    /// initial light reading.
    pub fn new(
        tuning: BrightnessTuning,
        mode: BrightnessMode,
        manual_level: u8,
        current_brightness: f64,
        initial_light: f64,
    ) -> Self {
        let mut sampler = AmbientLightSampler::with_capacity(tuning.light_samples);
        let calculator = TargetBrightnessCalculator::new(tuning.calibration);
        let manual_level = manual_level.min(100);

        let averaged = sampler.sample(initial_light);
        let initial_target = calculator.compute_target(mode, manual_level, averaged);

        Self {
            mode,
            manual_level,
            current: current_brightness.clamp(0.0, 1.0),
            last_candidate: initial_target,
            hysteresis_enabled: tuning.hysteresis,
            sampler,
            calculator,
            stabilizer: HysteresisStabilizer::with_tuning(initial_target, tuning.epsilon, tuning.dwell),
            ramp: SmoothingRamp::new(tuning.ramp_step),
        }
    }

    pub fn mode(&self) -> BrightnessMode {
        self.mode
    }

    pub fn current_brightness(&self) -> f64 {
        self.current
    }

    #[cfg(test)]
    pub fn stable_target(&self) -> f64 {
        self.stabilizer.stable_target()
    }

    #[cfg(test)]
    pub fn pending_target(&self) -> Option<f64> {
        self.stabilizer.pending_target()
    }

    #[cfg(test)]
    pub fn sampler(&self) -> &AmbientLightSampler {
        &self.sampler
    }

    /// Switch mode; any pending auto candidate is dropped.
    pub fn set_mode(&mut self, mode: BrightnessMode) {
        if self.mode != mode {
            self.mode = mode;
            self.stabilizer.reset();
        }
    }

    pub fn set_manual_level(&mut self, level: u8) {
        self.manual_level = level.min(100);
    }

    /// Pull mode and level from the shared intent.
    pub fn sync_intent(&mut self, intent: &BrightnessIntent) {
        self.set_mode(intent.mode());
        self.set_manual_level(intent.manual_level());
    }

    /// Run one control tick now.
    pub fn update(&mut self, raw_light: f64) -> f64 {
        self.update_at(raw_light, Instant::now())
    }

    /// Run one control tick at `now` and return the brightness to emit.
    ///
    /// The light reading is only sampled in auto mode, so a manual period
    /// does not leave stale readings in the average.
    pub fn update_at(&mut self, raw_light: f64, now: Instant) -> f64 {
        let target = match self.mode {
            BrightnessMode::Auto => {
                let averaged = self.sampler.sample(raw_light);
                let candidate = self.calculator.from_light(averaged);
                debug!("Auto brightness: light {:.2} -> target {:.2}", averaged, candidate);
                self.last_candidate = candidate;

                if self.hysteresis_enabled {
                    self.stabilizer.stabilize(candidate, now)
                } else {
                    self.stabilizer.force(candidate);
                    candidate
                }
            }
            BrightnessMode::Manual => {
                let candidate =
                    self.calculator
                        .compute_target(self.mode, self.manual_level, self.sampler.average());
                self.last_candidate = candidate;
                self.stabilizer.force(candidate);
                candidate
            }
        };

        self.current = self.ramp.advance(self.current, target).clamp(0.0, 1.0);
        self.current
    }

    /// Snapshot for status reporting.
    pub fn status(&self) -> BrightnessStatus {
        let level = match self.mode {
            BrightnessMode::Manual => f64::from(self.manual_level),
            BrightnessMode::Auto => self.last_candidate,
        };
        BrightnessStatus {
            mode: self.mode,
            level,
            current: self.current,
            target: self.stabilizer.stable_target(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(ms: u64, start: Instant) -> Instant {
        start + Duration::from_millis(ms)
    }

    #[test]
    fn test_dark_room_settles_at_floor() {
        let mut controller = BrightnessController::new(
            BrightnessTuning::default(),
            BrightnessMode::Auto,
            DEFAULT_MANUAL_LEVEL,
            0.06,
            10.0,
        );
        let start = Instant::now();

        for i in 0..5 {
            controller.update_at(10.0, tick(i * 500, start));
        }
        assert_eq!(controller.sampler().average(), 10.0);
        assert_eq!(controller.stable_target(), 0.06);
        assert_eq!(controller.current_brightness(), 0.06);
    }

    #[test]
    fn test_manual_level_ramps_in_steps() {
        let intent = BrightnessIntent::new(BrightnessMode::Manual, 50);
        let mut controller = BrightnessController::new(
            BrightnessTuning::default(),
            BrightnessMode::Manual,
            50,
            0.50,
            0.0,
        );
        let start = Instant::now();

        assert_eq!(intent.adjust(BRIGHTNESS_STEP), Some(55));
        controller.sync_intent(&intent);

        let trace: Vec<f64> = (0..3)
            .map(|i| controller.update_at(0.0, tick(i * 1000, start)))
            .collect();
        assert!((trace[0] - 0.52).abs() < 1e-9);
        assert!((trace[1] - 0.54).abs() < 1e-9);
        assert_eq!(trace[2], 0.55);
        assert_eq!(controller.stable_target(), 0.55);
    }

    #[test]
    fn test_brightening_room_waits_for_dwell() {
        let mut controller = BrightnessController::new(
            BrightnessTuning {
                light_samples: 1,
                ..BrightnessTuning::default()
            },
            BrightnessMode::Auto,
            DEFAULT_MANUAL_LEVEL,
            0.06,
            10.0,
        );
        let start = Instant::now();

        controller.update_at(30.0, tick(0, start));
        controller.update_at(30.0, tick(500, start));
        assert_eq!(controller.stable_target(), 0.06);
        assert_eq!(controller.current_brightness(), 0.06);

        controller.update_at(30.0, tick(1000, start));
        assert_eq!(controller.stable_target(), 0.31);
        assert!((controller.current_brightness() - 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_hysteresis_can_be_disabled() {
        let mut controller = BrightnessController::new(
            BrightnessTuning {
                light_samples: 1,
                hysteresis: false,
                ..BrightnessTuning::default()
            },
            BrightnessMode::Auto,
            DEFAULT_MANUAL_LEVEL,
            0.06,
            10.0,
        );

        controller.update_at(30.0, Instant::now());
        assert_eq!(controller.stable_target(), 0.31);
    }

    #[test]
    fn test_mode_switch_drops_pending_candidate() {
        let mut controller = BrightnessController::new(
            BrightnessTuning {
                light_samples: 1,
                ..BrightnessTuning::default()
            },
            BrightnessMode::Auto,
            DEFAULT_MANUAL_LEVEL,
            0.06,
            10.0,
        );

        controller.update_at(30.0, Instant::now());
        assert!(controller.pending_target().is_some());
        controller.set_mode(BrightnessMode::Manual);
        assert!(controller.pending_target().is_none());
    }

    #[test]
    fn test_startup_reading_sampled_in_manual_mode() {
        let mut controller = BrightnessController::new(
            BrightnessTuning::default(),
            BrightnessMode::Manual,
            50,
            0.5,
            10.0,
        );
        assert_eq!(controller.sampler().average(), 10.0);

        controller.set_mode(BrightnessMode::Auto);
        controller.update_at(30.0, Instant::now());
        assert_eq!(controller.sampler().len(), 2);
        assert_eq!(controller.sampler().average(), 20.0);
    }

    #[test]
    fn test_adjust_ignored_in_auto_mode() {
        let intent = BrightnessIntent::new(BrightnessMode::Auto, 50);
        assert_eq!(intent.adjust(BRIGHTNESS_STEP), None);
        assert_eq!(intent.manual_level(), 50);
    }

    #[test]
    fn test_adjust_clamps_level() {
        let intent = BrightnessIntent::new(BrightnessMode::Manual, 98);
        assert_eq!(intent.adjust(BRIGHTNESS_STEP), Some(100));
        assert_eq!(intent.manual_level(), 100);

        let intent = BrightnessIntent::new(BrightnessMode::Manual, 3);
        assert_eq!(intent.adjust(-BRIGHTNESS_STEP), Some(0));
    }

    #[test]
    fn test_toggle_mode() {
        let intent = BrightnessIntent::new(BrightnessMode::Auto, 50);
        assert_eq!(intent.toggle_mode(), BrightnessMode::Manual);
        assert_eq!(intent.mode(), BrightnessMode::Manual);
        assert_eq!(intent.toggle_mode(), BrightnessMode::Auto);
    }

    #[test]
    fn test_status_reports_level_per_mode() {
        let mut controller = BrightnessController::new(
            BrightnessTuning::default(),
            BrightnessMode::Manual,
            40,
            0.4,
            0.0,
        );
        assert_eq!(controller.status().level, 40.0);

        controller.set_mode(BrightnessMode::Auto);
        controller.update_at(10.0, Instant::now());
        let status = controller.status();
        assert_eq!(status.mode, BrightnessMode::Auto);
        assert_eq!(status.level, 0.06);
    }
}
