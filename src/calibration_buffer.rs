//! A fixed-capacity record of filtered readings taken while the sensor is
//! at rest, reduced to a baseline by a trimmed mean.

use crate::real::Real;
use std::fmt;

/// Why a [CalibrationBuffer] operation was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// A buffer must hold at least one reading
    ZeroCapacity,
    /// The buffer is already full
    Overflow {
        /// Readings the buffer holds
        capacity: usize,
    },
    /// The trimmed mean needs a full buffer
    NotFull {
        /// Readings held
        len: usize,
        /// Readings required
        capacity: usize,
    },
    /// The trim percentage is outside `[0, 100)`
    InvalidTrim(f64),
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::ZeroCapacity => write!(f, "calibration buffer needs a capacity of at least 1"),
            CalibrationError::Overflow { capacity } => {
                write!(f, "calibration buffer is full ({capacity} readings)")
            }
            CalibrationError::NotFull { len, capacity } => {
                write!(f, "calibration buffer holds {len} of {capacity} readings")
            }
            CalibrationError::InvalidTrim(trim) => {
                write!(f, "calibration trim {trim}% is outside [0, 100)")
            }
        }
    }
}

impl std::error::Error for CalibrationError {}

/// Up to `capacity` readings of width `N`, in arrival order.
#[derive(Debug, Clone)]
pub struct CalibrationBuffer<T: Real, const N: usize> {
    data: Vec<[T; N]>,
    capacity: usize,
}

impl<T: Real, const N: usize> CalibrationBuffer<T, N> {
    /// An empty buffer for exactly `capacity` readings.
    pub fn new(capacity: usize) -> Result<Self, CalibrationError> {
        if capacity == 0 {
            return Err(CalibrationError::ZeroCapacity);
        }
        Ok(Self {
            data: Vec::with_capacity(capacity),
            capacity,
        })
    }

    /// A buffer sized for `calibration_time / dt` readings, rounded.
    pub fn for_duration(calibration_time: f64, dt: f64) -> Result<Self, CalibrationError> {
        if !(calibration_time > 0.0 && dt > 0.0) {
            return Err(CalibrationError::ZeroCapacity);
        }
        Self::new((calibration_time / dt).round() as usize)
    }

    /// Stores `reading`, or refuses if the buffer is full.
    pub fn append(&mut self, reading: [T; N]) -> Result<(), CalibrationError> {
        if self.full() {
            return Err(CalibrationError::Overflow {
                capacity: self.capacity,
            });
        }
        self.data.push(reading);
        Ok(())
    }

    /// True once `capacity` readings are stored
    pub fn full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    /// Readings stored so far
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Readings the buffer holds when full
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every stored reading; the capacity is kept.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// The stored readings, oldest first, that survive dropping the oldest
    /// `trim_percent` percent.
    pub fn trimmed(&self, trim_percent: f64) -> Result<&[[T; N]], CalibrationError> {
        if !(0.0..100.0).contains(&trim_percent) {
            return Err(CalibrationError::InvalidTrim(trim_percent));
        }
        let from = (trim_percent / 100.0 * self.capacity as f64).floor() as usize;
        Ok(&self.data[from.min(self.data.len())..])
    }

    /// Per-channel mean of the readings that survive trimming. The buffer
    /// must be full.
    ///
    /// Computed as an offset from the first surviving reading, so a buffer of
    /// identical readings yields that reading exactly.
    pub fn trimmed_mean(&self, trim_percent: f64) -> Result<[T; N], CalibrationError> {
        if !self.full() {
            return Err(CalibrationError::NotFull {
                len: self.data.len(),
                capacity: self.capacity,
            });
        }
        let kept = self.trimmed(trim_percent)?;
        let Some(first) = kept.first() else {
            return Ok([T::zero(); N]);
        };

        let count = T::from_f64(kept.len() as f64);
        let mut mean = *first;
        for (ch, slot) in mean.iter_mut().enumerate() {
            let offset = kept
                .iter()
                .fold(T::zero(), |acc, reading| acc + (reading[ch] - first[ch]));
            *slot = first[ch] + offset / count;
        }
        Ok(mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(capacity: usize, f: impl Fn(usize) -> [f64; 2]) -> CalibrationBuffer<f64, 2> {
        let mut buf = CalibrationBuffer::new(capacity).unwrap();
        for i in 0..capacity {
            buf.append(f(i)).unwrap();
        }
        buf
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(
            CalibrationBuffer::<f64, 2>::new(0).unwrap_err(),
            CalibrationError::ZeroCapacity
        );
        assert_eq!(
            CalibrationBuffer::<f64, 2>::for_duration(0.004, 0.01).unwrap_err(),
            CalibrationError::ZeroCapacity
        );
        assert_eq!(
            CalibrationBuffer::<f64, 2>::for_duration(1.0, 0.01)
                .unwrap()
                .capacity(),
            100
        );
    }

    #[test]
    fn overflow_is_an_error() {
        let mut buf = filled(3, |_| [0.0, 0.0]);
        assert!(buf.full());
        assert_eq!(
            buf.append([1.0, 1.0]).unwrap_err(),
            CalibrationError::Overflow { capacity: 3 }
        );
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn identical_readings_average_exactly() {
        let v = [0.1 + 0.2, 1.0 / 3.0];
        let buf = filled(97, |_| v);
        assert_eq!(buf.trimmed_mean(10.0).unwrap(), v);

        let mut buf32 = CalibrationBuffer::<f32, 1>::new(1000).unwrap();
        for _ in 0..1000 {
            buf32.append([0.7]).unwrap();
        }
        assert_eq!(buf32.trimmed_mean(0.0).unwrap(), [0.7]);
    }

    #[test]
    fn trimming_drops_oldest() {
        let buf = filled(100, |i| [i as f64, -(i as f64)]);
        assert_eq!(buf.trimmed(10.0).unwrap().len(), 90);
        assert_eq!(buf.trimmed(10.0).unwrap()[0], [10.0, -10.0]);

        let mean = buf.trimmed_mean(10.0).unwrap();
        assert!((mean[0] - 54.5).abs() < 1e-12);
        assert!((mean[1] + 54.5).abs() < 1e-12);
    }

    #[test]
    fn trim_rounds_down() {
        let buf = filled(7, |i| [i as f64, 0.0]);
        // 7 * 0.2 = 1.4 readings, so one is dropped
        assert_eq!(buf.trimmed(20.0).unwrap().len(), 6);
    }

    #[test]
    fn mean_needs_full_buffer_and_valid_trim() {
        let mut buf = CalibrationBuffer::<f64, 2>::new(4).unwrap();
        buf.append([1.0, 1.0]).unwrap();
        assert_eq!(
            buf.trimmed_mean(0.0).unwrap_err(),
            CalibrationError::NotFull {
                len: 1,
                capacity: 4
            }
        );
        assert_eq!(
            buf.trimmed(100.0).unwrap_err(),
            CalibrationError::InvalidTrim(100.0)
        );
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut buf = filled(5, |_| [1.0, 2.0]);
        buf.clear();
        assert!(buf.is_empty());
        assert!(!buf.full());
        assert_eq!(buf.capacity(), 5);
        buf.append([3.0, 4.0]).unwrap();
        assert_eq!(buf.len(), 1);
    }
}
