//! The textual setup handshake that takes the force/torque sensor from
//! free-run into configuration mode, applies the communication and filter
//! settings, and puts it back into run mode.
//!
//! Every command is answered with a response of the form
//! `r,<status>,<command>,<code>`, e.g. `r,0,C,0` for a successful switch to
//! configuration mode.

use crate::byte_source::{is_transient, ByteSource};
use log::{debug, info};
use nom::{
    bytes::complete::tag,
    character::complete::{anychar, char, i32, u32},
    combinator::map,
    sequence::{preceded, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt, io,
    thread::sleep,
    time::{Duration, Instant},
};

/// Printed by the sensor once it has booted
pub const BOOT_BANNER: &str = "App Init";

/// Keep at most this much unmatched text around while waiting for a reply.
const MAX_COLLECTED: usize = 4096;

/// Sensor-side configuration applied during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SetupConfig {
    /// Length of the on-board sinc filter
    pub sinc_length: u32,
    /// Chopping on (1) or off (0)
    pub chop_enable: u8,
    /// Fast mode on (1) or off (0)
    pub fast_enable: u8,
    /// FIR filter disabled (1) or enabled (0)
    pub fir_disable: u8,
    /// Temperature compensation; 0 disabled, 1 enabled
    pub temp_compensation: u8,
    /// 1 applies the calibration matrix, 0 streams raw measurements
    pub use_calibration: u8,
    /// 0 binary, 1 CSV
    pub data_format: u8,
    /// 0: 9600, 1: 57600, 2: 115200, 3: 230400, 4: 460800
    pub baud_rate_config: u8,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            sinc_length: 512,
            chop_enable: 0,
            fast_enable: 0,
            fir_disable: 1,
            temp_compensation: 0,
            use_calibration: 1,
            data_format: 0,
            baud_rate_config: 4,
        }
    }
}

impl SetupConfig {
    /// The `c,...` communication setup command
    pub fn communication_command(&self) -> String {
        format!(
            "c,{},{},{},{}",
            self.temp_compensation, self.use_calibration, self.data_format, self.baud_rate_config
        )
    }

    /// The `f,...` filter setup command
    pub fn filter_command(&self) -> String {
        format!(
            "f,{},{},{},{}",
            self.sinc_length, self.chop_enable, self.fast_enable, self.fir_disable
        )
    }
}

/// How long each step of the handshake may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeTimeouts {
    /// Waiting for the boot banner
    pub boot: Duration,
    /// Waiting for each command's acknowledgement
    pub command: Duration,
    /// Back-off when the line has nothing to read
    pub poll_interval: Duration,
}

impl Default for HandshakeTimeouts {
    fn default() -> Self {
        Self {
            boot: Duration::from_secs(10),
            command: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// A parsed `r,<status>,<command>,<code>` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorResponse {
    /// Zero on success
    pub status: u32,
    /// The command being answered
    pub command: char,
    /// Command-specific result code
    pub code: i32,
}

impl fmt::Display for SensorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r,{},{},{}", self.status, self.command, self.code)
    }
}

/// Why the handshake failed. Both are fatal to startup.
#[derive(Debug)]
pub enum HandshakeError {
    /// The expected text did not show up in time
    Timeout {
        /// The string we were waiting for
        waiting_for: String,
        /// The last reply the sensor did send, if any
        last_response: Option<SensorResponse>,
    },
    /// The line itself failed
    Io(io::Error),
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::Timeout {
                waiting_for,
                last_response: Some(response),
            } => write!(
                f,
                "timed out waiting for '{waiting_for}' (sensor last replied '{response}')"
            ),
            HandshakeError::Timeout { waiting_for, .. } => {
                write!(f, "timed out waiting for '{waiting_for}'")
            }
            HandshakeError::Io(error) => write!(f, "io error during handshake: {error}"),
        }
    }
}

impl std::error::Error for HandshakeError {}

impl From<io::Error> for HandshakeError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

fn parse_response(s: &str) -> IResult<&str, SensorResponse> {
    map(
        tuple((
            preceded(tag("r,"), u32),
            preceded(char(','), anychar),
            preceded(char(','), i32),
        )),
        |(status, command, code)| SensorResponse {
            status,
            command,
            code,
        },
    )(s)
}

/// Finds the last well-formed reply in whatever the sensor has sent.
pub fn last_response(collected: &[u8]) -> Option<SensorResponse> {
    let text = String::from_utf8_lossy(collected);
    text.rmatch_indices("r,")
        .find_map(|(idx, _)| parse_response(&text[idx..]).ok().map(|(_, r)| r))
}

/// Reads until the received bytes end with `terminator`, or fails once
/// `timeout` has passed.
pub fn read_until<S: ByteSource + ?Sized>(
    source: &mut S,
    terminator: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), HandshakeError> {
    let deadline = Instant::now() + timeout;
    let mut collected = Vec::new();

    loop {
        if Instant::now() > deadline {
            return Err(HandshakeError::Timeout {
                waiting_for: terminator.to_owned(),
                last_response: last_response(&collected),
            });
        }

        match source.read_byte() {
            Ok(Some(byte)) => {
                collected.push(byte);
                if collected.ends_with(terminator.as_bytes()) {
                    return Ok(());
                }
                if collected.len() > MAX_COLLECTED {
                    collected.drain(..MAX_COLLECTED / 2);
                }
            }
            Ok(None) => sleep(poll_interval),
            Err(e) if is_transient(&e) => sleep(poll_interval),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Sends `command` and waits for `ack`.
pub fn write_and_check<S: ByteSource + ?Sized>(
    source: &mut S,
    command: &str,
    ack: &str,
    timeouts: &HandshakeTimeouts,
) -> Result<(), HandshakeError> {
    debug!("sending '{command}', expecting '{ack}'");
    source.send(command.as_bytes())?;
    read_until(source, ack, timeouts.command, timeouts.poll_interval)
}

/// Runs the whole setup sequence: boot banner, configuration mode,
/// communication setup, filter setup, run mode.
pub fn perform<S: ByteSource + ?Sized>(
    source: &mut S,
    setup: &SetupConfig,
    timeouts: &HandshakeTimeouts,
) -> Result<(), HandshakeError> {
    info!("waiting for sensor boot banner");
    read_until(source, BOOT_BANNER, timeouts.boot, timeouts.poll_interval)?;
    source.discard_input()?;

    write_and_check(source, "C", "r,0,C,0", timeouts)?;
    write_and_check(source, &setup.communication_command(), "r,0,c,0", timeouts)?;
    write_and_check(source, &setup.filter_command(), "r,0,f,0", timeouts)?;
    write_and_check(source, "R", "r,0,R,0", timeouts)?;

    info!("sensor configured and streaming");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_source::MemorySource;
    use std::collections::VecDeque;

    /// Replies to each command with a canned answer, like the real sensor.
    struct ScriptedSensor {
        input: VecDeque<u8>,
        sent: Vec<String>,
        reject: Option<char>,
    }

    impl ScriptedSensor {
        fn new(reject: Option<char>) -> Self {
            Self {
                input: b"booting...App Init\r\n".iter().copied().collect(),
                sent: Vec::new(),
                reject,
            }
        }
    }

    impl ByteSource for ScriptedSensor {
        fn read_byte(&mut self) -> io::Result<Option<u8>> {
            Ok(self.input.pop_front())
        }

        fn read_exact(&mut self, _buf: &mut [u8]) -> io::Result<()> {
            Err(io::ErrorKind::UnexpectedEof.into())
        }

        fn send(&mut self, data: &[u8]) -> io::Result<()> {
            let cmd = String::from_utf8_lossy(data).into_owned();
            let letter = cmd.chars().next().unwrap_or('?');
            let status = if Some(letter) == self.reject { 1 } else { 0 };
            self.input.extend(format!("r,{status},{letter},0\r\n").bytes());
            self.sent.push(cmd);
            Ok(())
        }

        fn discard_input(&mut self) -> io::Result<()> {
            self.input.clear();
            Ok(())
        }
    }

    fn quick() -> HandshakeTimeouts {
        HandshakeTimeouts {
            boot: Duration::from_millis(50),
            command: Duration::from_millis(50),
            poll_interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn full_sequence_sends_commands_in_order() {
        let mut sensor = ScriptedSensor::new(None);
        perform(&mut sensor, &SetupConfig::default(), &quick()).unwrap();
        assert_eq!(sensor.sent, vec!["C", "c,0,1,0,4", "f,512,0,0,1", "R"]);
    }

    #[test]
    fn missing_banner_times_out() {
        let mut src = MemorySource::new(b"garbage".to_vec());
        let err = perform(&mut src, &SetupConfig::default(), &quick()).unwrap_err();
        match err {
            HandshakeError::Timeout { waiting_for, .. } => assert_eq!(waiting_for, BOOT_BANNER),
            other => panic!("unexpected {other}"),
        }
        assert!(src.written().is_empty());
    }

    #[test]
    fn rejected_command_reports_last_reply() {
        let mut sensor = ScriptedSensor::new(Some('f'));
        let err = perform(&mut sensor, &SetupConfig::default(), &quick()).unwrap_err();
        match err {
            HandshakeError::Timeout {
                waiting_for,
                last_response,
            } => {
                assert_eq!(waiting_for, "r,0,f,0");
                assert_eq!(
                    last_response,
                    Some(SensorResponse {
                        status: 1,
                        command: 'f',
                        code: 0
                    })
                );
            }
            other => panic!("unexpected {other}"),
        }
        assert_eq!(sensor.sent.len(), 3);
    }

    #[test]
    fn parses_replies() {
        assert_eq!(
            last_response(b"xx r,0,C,0\r\nr,2,c,-3\r\n"),
            Some(SensorResponse {
                status: 2,
                command: 'c',
                code: -3
            })
        );
        assert_eq!(last_response(b"App Init"), None);
    }
}
