//! The interface the control loop uses to pull readings from a sensor,
//! whatever the sensor's transport is.

use crate::handshake::HandshakeError;
use std::{fmt, io};

/// Something that yields a fixed-width reading of `N` channels on demand.
///
/// Implementations must be quick: the control loop calls [ChannelSource::read]
/// once per tick.
pub trait ChannelSource<const N: usize>: Send {
    /// The most recent reading
    fn read(&mut self) -> Result<[f64; N], SensorError>;
}

/// Why a sensor could not be set up or read.
#[derive(Debug)]
pub enum SensorError {
    /// The bus or serial line failed
    Io(io::Error),
    /// The setup handshake did not complete
    Handshake(HandshakeError),
    /// The background acquisition worker is gone
    WorkerStopped(String),
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::Io(error) => write!(f, "sensor io error: {error}"),
            SensorError::Handshake(error) => write!(f, "sensor setup failed: {error}"),
            SensorError::WorkerStopped(reason) => {
                write!(f, "acquisition worker stopped: {reason}")
            }
        }
    }
}

impl std::error::Error for SensorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SensorError::Io(error) => Some(error),
            SensorError::Handshake(error) => Some(error),
            SensorError::WorkerStopped(_) => None,
        }
    }
}

impl From<io::Error> for SensorError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<HandshakeError> for SensorError {
    fn from(value: HandshakeError) -> Self {
        Self::Handshake(value)
    }
}
