//! A scalar Kalman estimator, one per channel.

use crate::real::Real;
use serde::{Deserialize, Serialize};

/// Tuning for a [KalmanFilter]. These stay fixed for the filter's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct KalmanParams {
    /// Process variance `q`
    pub process_variance: f64,
    /// Measurement variance `r`
    pub measurement_variance: f64,
    /// Error covariance `p` the estimate starts from after a reset
    pub initial_error_covariance: f64,
}

impl Default for KalmanParams {
    fn default() -> Self {
        Self {
            process_variance: 1e-5,
            measurement_variance: 1e-2,
            initial_error_covariance: 1.0,
        }
    }
}

/// Tracks an estimate `x` and its error covariance `p` for a single channel.
#[derive(Debug, Clone)]
pub struct KalmanFilter<T: Real> {
    estimate: T,
    error_covariance: T,
    process_variance: T,
    measurement_variance: T,
    initial_error_covariance: T,
}

impl<T: Real> KalmanFilter<T> {
    /// Builds a filter whose estimate starts at `seed`.
    pub fn new(params: KalmanParams, seed: T) -> Self {
        let initial_error_covariance = T::from_f64(params.initial_error_covariance);
        Self {
            estimate: seed,
            error_covariance: initial_error_covariance,
            process_variance: T::from_f64(params.process_variance),
            measurement_variance: T::from_f64(params.measurement_variance),
            initial_error_covariance,
        }
    }

    /// Folds the measurement `z` into the estimate and returns the new estimate.
    pub fn compute(&mut self, z: T) -> T {
        // predict
        self.error_covariance = self.error_covariance + self.process_variance;

        // update
        let gain = self.error_covariance / (self.error_covariance + self.measurement_variance);
        self.estimate = self.estimate + gain * (z - self.estimate);
        self.error_covariance = (T::one() - gain) * self.error_covariance;

        self.estimate
    }

    /// Restarts the filter at `seed` with the initial error covariance.
    pub fn reset(&mut self, seed: T) {
        self.estimate = seed;
        self.error_covariance = self.initial_error_covariance;
    }

    /// The current estimate
    pub fn estimate(&self) -> T {
        self.estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_monotonically_on_constant_input() {
        let mut kf = KalmanFilter::new(KalmanParams::default(), 0.0_f64);
        let target = 5.0;
        let mut last_error = f64::INFINITY;

        for _ in 0..500 {
            let error = (kf.compute(target) - target).abs();
            assert!(error <= last_error);
            last_error = error;
        }

        assert!(last_error < 1e-3, "still {last_error} away");
    }

    #[test]
    fn first_step_uses_gain_from_initial_covariance() {
        let params = KalmanParams {
            process_variance: 0.0,
            measurement_variance: 1.0,
            initial_error_covariance: 1.0,
        };
        let mut kf = KalmanFilter::new(params, 0.0_f32);

        // p = 1, k = 1 / 2
        assert_eq!(kf.compute(4.0), 2.0);
    }

    #[test]
    fn reset_restores_seed_and_covariance() {
        let params = KalmanParams::default();
        let mut kf = KalmanFilter::new(params, 0.0_f64);
        for _ in 0..50 {
            kf.compute(10.0);
        }

        kf.reset(3.0);
        assert_eq!(kf.estimate(), 3.0);

        let mut fresh = KalmanFilter::new(params, 3.0_f64);
        assert_eq!(kf.compute(7.0), fresh.compute(7.0));
    }
}
