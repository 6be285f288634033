//! Rolling average over raw ambient-light readings.

use std::collections::VecDeque;

/// Number of readings averaged by default.
pub const DEFAULT_LIGHT_SAMPLES: usize = 5;

/// Fixed-capacity FIFO of raw sensor readings.
///
/// Every reading is averaged in before it can be evicted. With a capacity
/// of 1 the sampler degrades to the instantaneous reading.
#[derive(Debug, Clone)]
pub struct AmbientLightSampler {
    readings: VecDeque<f64>,
    capacity: usize,
}

impl AmbientLightSampler {
    /// Create a sampler with the default capacity (5 readings).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LIGHT_SAMPLES)
    }

    /// Create a sampler holding at most `capacity` readings (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a raw reading and return the mean of the buffered readings.
    pub fn sample(&mut self, raw: f64) -> f64 {
        if self.readings.len() >= self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(raw);
        self.average()
    }

    /// Mean of the buffered readings, 0.0 when empty.
    pub fn average(&self) -> f64 {
        if self.readings.is_empty() {
            return 0.0;
        }
        self.readings.iter().sum::<f64>() / self.readings.len() as f64
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.readings.iter()
    }
}

impl Default for AmbientLightSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_partial_buffer_average() {
        let mut sampler = AmbientLightSampler::new();
        assert_eq!(sampler.average(), 0.0);

        assert_eq!(sampler.sample(10.0), 10.0);
        assert_eq!(sampler.sample(20.0), 15.0);
        assert_eq!(sampler.sample(30.0), 20.0);
        assert_eq!(sampler.len(), 3);
    }

    #[test]
    fn test_oldest_reading_evicted() {
        let mut sampler = AmbientLightSampler::with_capacity(5);
        for reading in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0] {
            sampler.sample(reading);
        }

        let kept: Vec<f64> = sampler.iter().copied().collect();
        assert_eq!(kept, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(sampler.average(), 5.0);
    }

    #[test]
    fn test_single_sample_is_instantaneous() {
        let mut sampler = AmbientLightSampler::with_capacity(1);
        assert_eq!(sampler.sample(12.0), 12.0);
        assert_eq!(sampler.sample(30.0), 30.0);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut sampler = AmbientLightSampler::with_capacity(0);
        sampler.sample(4.0);
        assert_eq!(sampler.sample(8.0), 8.0);
        assert_eq!(sampler.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_output_is_mean_of_last_five(
            readings in prop::collection::vec(0.0f64..4096.0, 1..60)
        ) {
            let mut sampler = AmbientLightSampler::new();

            for (i, reading) in readings.iter().enumerate() {
                let output = sampler.sample(*reading);

                let start = (i + 1).saturating_sub(DEFAULT_LIGHT_SAMPLES);
                let window = &readings[start..=i];
                let expected = window.iter().sum::<f64>() / window.len() as f64;

                prop_assert!((output - expected).abs() < 1e-9,
                    "output {} != expected {} after {} readings", output, expected, i + 1);
                prop_assert!(sampler.len() <= DEFAULT_LIGHT_SAMPLES);
            }
        }
    }
}
