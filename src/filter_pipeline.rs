//! The per-sensor filter cascade: median, Kalman, baseline-relative
//! normalization, optional threshold auto-reset, and optional post-median.
//!
//! Every channel owns its own filters, so a reading of width `N` is really
//! `N` independent scalar pipelines that share a baseline vector and a set
//! of mode flags.

use crate::kalman_filter::{KalmanFilter, KalmanParams};
use crate::median_filter::MedianFilter;
use crate::real::Real;
use serde::{Deserialize, Serialize};
use std::array;

/// Which optional stages of the cascade are active. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct FilterModes {
    /// Divide the baseline-subtracted value by the baseline (when non-zero)
    pub relative: bool,
    /// Snap the whole reading to zero and restart the cascade whenever every
    /// channel is below the threshold
    pub threshold: bool,
    /// Run a second median filter over the output
    pub post_median: bool,
}

/// Parameters for a [MultiChannelFilter].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSettings<T: Real> {
    /// Median window
    pub window: usize,
    /// Post-median window
    pub post_window: usize,
    /// Level every channel must be under for the threshold stage to fire
    pub threshold: T,
    /// Kalman tuning, shared by every channel
    pub kalman: KalmanParams,
    /// Optional stages
    pub modes: FilterModes,
}

#[derive(Debug, Clone)]
struct ChannelFilterState<T: Real> {
    median: MedianFilter<T>,
    kalman: KalmanFilter<T>,
    post_median: MedianFilter<T>,
}

impl<T: Real> ChannelFilterState<T> {
    fn new(settings: &FilterSettings<T>, seed: T) -> Self {
        Self {
            median: MedianFilter::new(settings.window),
            kalman: KalmanFilter::new(settings.kalman, seed),
            post_median: MedianFilter::new(settings.post_window),
        }
    }
}

/// `N` independent channel pipelines plus the baseline they are measured
/// against.
#[derive(Debug, Clone)]
pub struct MultiChannelFilter<T: Real, const N: usize> {
    settings: FilterSettings<T>,
    channels: [ChannelFilterState<T>; N],
    baseline: [T; N],
}

impl<T: Real, const N: usize> MultiChannelFilter<T, N> {
    /// Builds the cascade with every channel seeded at `baseline`.
    pub fn new(settings: FilterSettings<T>, baseline: [T; N]) -> Self {
        Self {
            channels: array::from_fn(|i| ChannelFilterState::new(&settings, baseline[i])),
            settings,
            baseline,
        }
    }

    /// Builds the cascade against an all-zero baseline.
    pub fn zeroed(settings: FilterSettings<T>) -> Self {
        Self::new(settings, [T::zero(); N])
    }

    /// Runs one reading through the cascade.
    pub fn compute(&mut self, reading: [T; N]) -> [T; N] {
        let mut out = reading;

        for (value, channel) in out.iter_mut().zip(self.channels.iter_mut()) {
            let smoothed = channel.median.compute(*value);
            *value = channel.kalman.compute(smoothed);
        }

        for (value, &base) in out.iter_mut().zip(self.baseline.iter()) {
            *value = *value - base;
            if self.settings.modes.relative && base != T::zero() {
                *value = *value / base;
            }
        }

        if self.settings.modes.threshold && out.iter().all(|&v| v < self.settings.threshold) {
            out = [T::zero(); N];
            self.reset(out);
        }

        if self.settings.modes.post_median {
            for (value, channel) in out.iter_mut().zip(self.channels.iter_mut()) {
                *value = channel.post_median.compute(*value);
            }
        }

        out
    }

    /// Throws away all channel state, reseeds every Kalman estimate at
    /// `baseline`, and makes `baseline` the new reference.
    pub fn reset(&mut self, baseline: [T; N]) {
        let settings = &self.settings;
        self.channels = array::from_fn(|i| ChannelFilterState::new(settings, baseline[i]));
        self.baseline = baseline;
    }

    /// The reference the cascade currently subtracts
    pub fn baseline(&self) -> &[T; N] {
        &self.baseline
    }

    /// The settings this cascade was built with
    pub fn settings(&self) -> &FilterSettings<T> {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings<T: Real>(modes: FilterModes) -> FilterSettings<T> {
        FilterSettings {
            window: 5,
            post_window: 3,
            threshold: T::from_f64(0.5),
            kalman: KalmanParams::default(),
            modes,
        }
    }

    #[test]
    fn reset_then_baseline_reads_zero() {
        let mut filter = MultiChannelFilter::<f64, 4>::zeroed(settings(FilterModes {
            relative: true,
            threshold: false,
            post_median: true,
        }));
        for i in 0..30 {
            filter.compute([i as f64, 2.0 * i as f64, -1.0, 0.3]);
        }

        let baseline = [1.0, 2.0, 3.0, 4.0];
        filter.reset(baseline);
        let out = filter.compute(baseline);
        for v in out {
            assert!(v.abs() < 1e-9, "{out:?}");
        }
        assert_eq!(filter.baseline(), &baseline);
    }

    #[test]
    fn absolute_mode_subtracts_baseline() {
        let mut filter = MultiChannelFilter::<f32, 2>::new(
            settings(FilterModes::default()),
            [1.0, 2.0],
        );
        // The Kalman estimate starts at the baseline, so a single step only
        // moves part of the way towards the new measurement.
        let out = filter.compute([3.0, 2.0]);
        assert!(out[0] > 0.0 && out[0] <= 2.0);
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn relative_mode_divides_by_baseline() {
        let modes = FilterModes {
            relative: true,
            ..FilterModes::default()
        };
        let mut absolute = MultiChannelFilter::<f64, 2>::new(settings(FilterModes::default()), [2.0, 0.0]);
        let mut relative = MultiChannelFilter::<f64, 2>::new(settings(modes), [2.0, 0.0]);

        let a = absolute.compute([4.0, 4.0]);
        let r = relative.compute([4.0, 4.0]);

        assert!((r[0] - a[0] / 2.0).abs() < 1e-12);
        // a zero baseline leaves the channel un-normalized
        assert_eq!(r[1], a[1]);
    }

    #[test]
    fn threshold_mode_zeroes_and_restarts() {
        let modes = FilterModes {
            threshold: true,
            ..FilterModes::default()
        };
        let mut filter = MultiChannelFilter::<f64, 3>::new(settings(modes), [1.0, 1.0, 1.0]);

        let out = filter.compute([1.1, 1.2, 0.9]);
        assert_eq!(out, [0.0, 0.0, 0.0]);
        assert_eq!(filter.baseline(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn threshold_needs_every_channel_below() {
        let modes = FilterModes {
            threshold: true,
            ..FilterModes::default()
        };
        let mut filter = MultiChannelFilter::<f64, 2>::new(settings(modes), [0.0, 0.0]);
        for _ in 0..50 {
            filter.compute([10.0, 0.0]);
        }
        let out = filter.compute([10.0, 0.0]);
        assert!(out[0] > 0.5);
        assert_eq!(filter.baseline(), &[0.0, 0.0]);
    }

    #[test]
    fn threshold_disabled_keeps_small_values() {
        let mut filter = MultiChannelFilter::<f64, 1>::new(settings(FilterModes::default()), [1.0]);
        let out = filter.compute([1.2]);
        assert!(out[0] > 0.0);
    }

    #[test]
    fn post_median_suppresses_single_spike() {
        let modes = FilterModes {
            post_median: true,
            ..FilterModes::default()
        };
        let mut s = settings::<f64>(modes);
        s.window = 1;
        s.kalman = KalmanParams {
            process_variance: 1.0,
            measurement_variance: 1e-12,
            initial_error_covariance: 1.0,
        };
        let mut filter = MultiChannelFilter::<f64, 1>::zeroed(s);

        filter.compute([1.0]);
        filter.compute([1.0]);
        let out = filter.compute([50.0]);
        assert!((out[0] - 1.0).abs() < 1e-6, "{out:?}");
    }
}
