//! The six-axis force/torque sensor: serial setup, background acquisition,
//! and re-expression of the latest frame in the fingertip frame.

use crate::acquisition_worker::{AcquisitionWorker, ReadingHandle};
use crate::byte_source::ByteSource;
use crate::config::ForceSensorConfig;
use crate::frame_synchronizer::FrameSynchronizer;
use crate::handshake::{self, HandshakeTimeouts};
use crate::rotation::{fingertip_torque, rotate_z};
use crate::sensor::{ChannelSource, SensorError};
use log::{info, warn};
use serial2::SerialPort;
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Number of channels a force/torque reading carries
pub const FORCE_CHANNELS: usize = 6;

/// Serial read timeout; bounds how long the worker blocks before it checks
/// for a stop request.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// How long [ForceTorqueSensor::start] waits for the first frame.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// A running force/torque sensor. Dropping it stops the acquisition worker.
pub struct ForceTorqueSensor {
    worker: AcquisitionWorker,
    reader: ReadingHandle,
    rotation_deg: f64,
    fingertip_offset: Option<f64>,
}

impl ForceTorqueSensor {
    /// Opens the serial port named in `config`, runs the setup handshake,
    /// and starts streaming.
    pub fn open(config: &ForceSensorConfig) -> Result<Self, SensorError> {
        info!("opening {} at {} baud", config.port, config.baud_rate);
        let mut port = SerialPort::open(&config.port, config.baud_rate)?;
        port.set_read_timeout(READ_TIMEOUT)?;
        Self::start(port, config, &HandshakeTimeouts::default())
    }

    /// Runs the setup handshake over `source`, then hands it to the
    /// acquisition worker.
    pub fn start<S>(
        mut source: S,
        config: &ForceSensorConfig,
        timeouts: &HandshakeTimeouts,
    ) -> Result<Self, SensorError>
    where
        S: ByteSource + Send + 'static,
    {
        handshake::perform(&mut source, &config.setup, timeouts)?;

        let worker = AcquisitionWorker::spawn(source, FrameSynchronizer::new())?;
        let reader = worker.reader();

        let deadline = Instant::now() + FIRST_FRAME_TIMEOUT;
        while reader.latest().frame.is_none() && Instant::now() < deadline {
            sleep(Duration::from_millis(10));
        }
        if reader.latest().frame.is_none() {
            warn!("no force/torque frame within {FIRST_FRAME_TIMEOUT:?}, reading zeros until one arrives");
        }

        Ok(Self {
            worker,
            reader,
            rotation_deg: config.rotation_deg,
            fingertip_offset: config.fingertip_offset,
        })
    }

    /// True while the acquisition worker is running
    pub fn is_streaming(&self) -> bool {
        self.worker.is_running()
    }
}

impl ChannelSource<FORCE_CHANNELS> for ForceTorqueSensor {
    /// `[fx, fy, fz, mx, my, mz]` from the latest frame, rotated into the
    /// fingertip frame. All zeros until the first frame arrives.
    fn read(&mut self) -> Result<[f64; FORCE_CHANNELS], SensorError> {
        let latest = self.reader.latest();
        if let Some(fault) = latest.fault {
            return Err(SensorError::WorkerStopped(fault));
        }
        let Some(frame) = latest.frame else {
            return Ok([0.0; FORCE_CHANNELS]);
        };

        let widen = |v: [f32; 3]| [v[0] as f64, v[1] as f64, v[2] as f64];
        let force = rotate_z(widen(frame.force()), self.rotation_deg);
        let mut torque = rotate_z(widen(frame.torque()), self.rotation_deg);
        if let Some(d) = self.fingertip_offset {
            torque = fingertip_torque(torque, force, d);
        }

        Ok([force[0], force[1], force[2], torque[0], torque[1], torque[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::dummy_sensor::SimulatedSerial;
    use crate::handshake::SetupConfig;

    fn config(rotation_deg: f64, fingertip_offset: Option<f64>) -> ForceSensorConfig {
        ForceSensorConfig {
            port: String::new(),
            baud_rate: 460_800,
            rotation_deg,
            fingertip_offset,
            filter: FilterConfig::default(),
            setup: SetupConfig::default(),
        }
    }

    fn quick() -> HandshakeTimeouts {
        HandshakeTimeouts {
            boot: Duration::from_millis(500),
            command: Duration::from_millis(500),
            poll_interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn streams_rotated_readings_from_simulated_sensor() {
        let source = SimulatedSerial::constant([1.0, 0.0, 2.0, 0.0, 1.0, 0.0]);
        let mut sensor = ForceTorqueSensor::start(source, &config(-45.0, None), &quick()).unwrap();
        assert!(sensor.is_streaming());

        let r = sensor.read().unwrap();
        let s = std::f64::consts::FRAC_1_SQRT_2;
        let expected = [s, -s, 2.0, s, s, 0.0];
        for (a, b) in r.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-5, "{r:?}");
        }
    }

    #[test]
    fn fingertip_offset_is_applied_after_rotation() {
        let source = SimulatedSerial::constant([0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        let mut sensor = ForceTorqueSensor::start(source, &config(0.0, Some(0.5)), &quick()).unwrap();
        let r = sensor.read().unwrap();
        assert!((r[3] + 0.5).abs() < 1e-6, "{r:?}");
    }

    #[test]
    fn silent_sensor_fails_setup() {
        let source = crate::byte_source::MemorySource::default();
        let timeouts = HandshakeTimeouts {
            boot: Duration::from_millis(20),
            ..quick()
        };
        let result = ForceTorqueSensor::start(source, &config(0.0, None), &timeouts);
        assert!(matches!(result, Err(SensorError::Handshake(_))));
    }
}
