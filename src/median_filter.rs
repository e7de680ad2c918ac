//! A sliding-window median filter, one per channel.

use crate::real::Real;
use std::cmp::Ordering;
use std::collections::VecDeque;

/// Keeps the last `window` values and reports their median.
#[derive(Debug, Clone)]
pub struct MedianFilter<T: Real> {
    window: usize,
    history: VecDeque<T>,
    scratch: Vec<T>,
}

impl<T: Real> MedianFilter<T> {
    /// A window of zero is treated as a window of one.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            history: VecDeque::with_capacity(window + 1),
            scratch: Vec::with_capacity(window),
        }
    }

    /// Pushes `value` and returns the median of everything currently held,
    /// which is fewer than `window` values until the history fills up.
    pub fn compute(&mut self, value: T) -> T {
        self.history.push_back(value);
        if self.history.len() > self.window {
            self.history.pop_front();
        }

        self.scratch.clear();
        self.scratch.extend(self.history.iter().copied());
        self.scratch
            .sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let mid = self.scratch.len() / 2;
        if self.scratch.len() % 2 == 1 {
            self.scratch[mid]
        } else {
            (self.scratch[mid - 1] + self.scratch[mid]) / T::from_f64(2.0)
        }
    }

    /// Forgets the history.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Number of values currently held
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// True before the first value arrives
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn brute_median(values: &[f64]) -> f64 {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 1 {
            sorted[mid]
        } else {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        }
    }

    #[test]
    fn matches_median_of_trailing_window() {
        let mut rng = StdRng::seed_from_u64(7);
        for window in [1, 2, 3, 5, 8] {
            let mut filter = MedianFilter::new(window);
            let values: Vec<f64> = (0..200).map(|_| rng.gen_range(-50.0..50.0)).collect();

            for (i, &v) in values.iter().enumerate() {
                let start = (i + 1).saturating_sub(window);
                let expected = brute_median(&values[start..=i]);
                assert_eq!(filter.compute(v), expected, "window {window}, step {i}");
            }
        }
    }

    #[test]
    fn rejects_a_single_spike() {
        let mut filter = MedianFilter::new(3);
        filter.compute(1.0_f32);
        filter.compute(100.0);
        assert_eq!(filter.compute(1.0), 1.0);
    }

    #[test]
    fn reset_clears_history() {
        let mut filter = MedianFilter::new(4);
        filter.compute(10.0_f64);
        filter.compute(20.0);
        filter.reset();
        assert!(filter.is_empty());
        assert_eq!(filter.compute(3.0), 3.0);
        assert_eq!(filter.len(), 1);
    }
}
