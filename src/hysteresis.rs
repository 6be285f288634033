//! Hysteresis stabilizer for the auto-brightness target.
//!
//! When ambient light hovers near a calibration boundary the computed target
//! flickers between neighbouring values. The stabilizer only trusts a new
//! target once the same candidate has been proposed for the whole dwell
//! window.

use std::time::{Duration, Instant};

/// Targets closer than this are considered equal.
pub const DEFAULT_EPSILON: f64 = 0.005;

/// How long a candidate must persist before it becomes the stable target.
pub const DEFAULT_DWELL: Duration = Duration::from_millis(1000);

/// Stabilizer state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum StabilizerState {
    /// Candidate agrees with the stable target
    #[default]
    Stable,
    /// A different candidate is waiting out the dwell window
    Pending { target: f64, since: Instant },
}

/// Dwell-based stabilizer over a continuous target signal.
#[derive(Debug, Clone)]
pub struct HysteresisStabilizer {
    /// Currently trusted target
    stable_target: f64,
    state: StabilizerState,
    epsilon: f64,
    dwell: Duration,
}

impl HysteresisStabilizer {
    /// Create a stabilizer trusting `initial_target` with default tuning.
    #[cfg(test)]
    pub fn new(initial_target: f64) -> Self {
        Self::with_tuning(initial_target, DEFAULT_EPSILON, DEFAULT_DWELL)
    }

    pub fn with_tuning(initial_target: f64, epsilon: f64, dwell: Duration) -> Self {
        Self {
            stable_target: initial_target,
            state: StabilizerState::Stable,
            epsilon,
            dwell,
        }
    }

    pub fn stable_target(&self) -> f64 {
        self.stable_target
    }

    #[cfg(test)]
    pub fn state(&self) -> StabilizerState {
        self.state
    }

    /// Pending candidate, if one is waiting.
    #[cfg(test)]
    pub fn pending_target(&self) -> Option<f64> {
        match self.state {
            StabilizerState::Pending { target, .. } => Some(target),
            StabilizerState::Stable => None,
        }
    }

    fn is_close(&self, a: f64, b: f64) -> bool {
        (a - b).abs() < self.epsilon
    }

    /// Feed a candidate observed at `now` and return the stable target.
    pub fn stabilize(&mut self, candidate: f64, now: Instant) -> f64 {
        if self.is_close(candidate, self.stable_target) {
            self.state = StabilizerState::Stable;
            return self.stable_target;
        }

        match self.state {
            StabilizerState::Pending { target, since } if self.is_close(candidate, target) => {
                if now.saturating_duration_since(since) >= self.dwell {
                    self.stable_target = target;
                    self.state = StabilizerState::Stable;
                    tracing::debug!("Stable brightness target committed: {:.3}", target);
                }
            }
            _ => {
                self.state = StabilizerState::Pending {
                    target: candidate,
                    since: now,
                };
            }
        }

        self.stable_target
    }

    /// Accept `target` immediately and drop any pending candidate.
    ///
    /// Used in manual mode, where the user's level needs no confirmation.
    pub fn force(&mut self, target: f64) {
        self.stable_target = target;
        self.state = StabilizerState::Stable;
    }

    /// Drop any pending candidate without touching the stable target.
    pub fn reset(&mut self) {
        self.state = StabilizerState::Stable;
    }
}
