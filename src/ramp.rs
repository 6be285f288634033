//! Constant-velocity brightness ramp.

/// Default brightness change per control tick.
pub const DEFAULT_STEP: f64 = 0.02;

/// Moves the emitted brightness toward the stable target by a bounded step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingRamp {
    step: f64,
}

impl SmoothingRamp {
    pub fn new(step: f64) -> Self {
        Self { step: step.abs() }
    }

    /// Advance `current` one tick toward `target` without overshooting.
    pub fn advance(&self, current: f64, target: f64) -> f64 {
        if (target - current).abs() <= self.step {
            target
        } else if target > current {
            (current + self.step).min(target)
        } else {
            (current - self.step).max(target)
        }
    }
}

impl Default for SmoothingRamp {
    fn default() -> Self {
        Self::new(DEFAULT_STEP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Values on a 1/1024 grid add and subtract exactly.
    fn grid(n: u32) -> f64 {
        f64::from(n) / 1024.0
    }

    #[test]
    fn test_ramp_up_with_clipped_final_step() {
        let ramp = SmoothingRamp::default();
        let mut current = 0.50;
        let mut trace = Vec::new();

        for _ in 0..3 {
            current = ramp.advance(current, 0.55);
            trace.push(current);
        }

        assert!((trace[0] - 0.52).abs() < 1e-9);
        assert!((trace[1] - 0.54).abs() < 1e-9);
        assert_eq!(trace[2], 0.55);
    }

    #[test]
    fn test_ramp_down() {
        let ramp = SmoothingRamp::default();
        let current = ramp.advance(0.31, 0.06);
        assert!((current - 0.29).abs() < 1e-9);
    }

    #[test]
    fn test_at_target_is_stationary() {
        let ramp = SmoothingRamp::default();
        assert_eq!(ramp.advance(0.3, 0.3), 0.3);
    }

    #[test]
    fn test_just_beyond_step_does_not_snap() {
        let ramp = SmoothingRamp::new(grid(8));
        let target = grid(500) + grid(8) + 1e-9;

        let next = ramp.advance(grid(500), target);
        assert_eq!(next, grid(508));
        assert_ne!(next, target);
        assert_eq!(ramp.advance(next, target), target);
    }

    proptest! {
        #[test]
        fn prop_step_is_bounded(
            current in 0u32..=1024,
            target in 0u32..=1024,
            step in 1u32..=200,
        ) {
            let (current, target, step) = (grid(current), grid(target), grid(step));
            let ramp = SmoothingRamp::new(step);
            let next = ramp.advance(current, target);

            prop_assert!((next - current).abs() <= step);
            // Never overshoots
            if target >= current {
                prop_assert!(next <= target && next >= current);
            } else {
                prop_assert!(next >= target && next <= current);
            }
        }

        #[test]
        fn prop_converges_within_ceil_ticks(
            current in 0u32..=1024,
            target in 0u32..=1024,
            step in 1u32..=200,
        ) {
            let ticks = current.abs_diff(target).div_ceil(step);
            let (current, target, step) = (grid(current), grid(target), grid(step));
            let ramp = SmoothingRamp::new(step);

            let mut value = current;
            for _ in 0..ticks {
                value = ramp.advance(value, target);
            }
            prop_assert_eq!(value, target);
        }
    }
}
