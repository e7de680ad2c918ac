//! The byte-level connection to the force/torque sensor.
//!
//! The frame synchronizer and the setup handshake only need four things
//! from the wire, captured by [ByteSource]. The real implementation is a
//! [serial2::SerialPort]; tests and replays use [MemorySource].

use serial2::SerialPort;
use std::collections::VecDeque;
use std::io::{self, ErrorKind};

/// A bidirectional byte stream to a sensor.
pub trait ByteSource {
    /// Reads one byte. `Ok(None)` means no data is available yet and the
    /// caller should try again; `Err` is a hard failure.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Fills `buf` completely or fails. A failure whose kind satisfies
    /// [is_underrun] means the stream simply ran dry.
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Writes all of `data`.
    fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Drops anything received but not yet read.
    fn discard_input(&mut self) -> io::Result<()>;
}

/// True for errors that only mean "nothing to read right now".
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

/// True for errors that mean a multi-byte read came up short.
pub fn is_underrun(err: &io::Error) -> bool {
    is_transient(err) || err.kind() == ErrorKind::UnexpectedEof
}

impl ByteSource for SerialPort {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match SerialPort::read(self, &mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if is_transient(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match SerialPort::read(self, &mut buf[filled..]) {
                Ok(0) => return Err(ErrorKind::UnexpectedEof.into()),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < data.len() {
            match SerialPort::write(self, &data[written..]) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.discard_input_buffer()
    }
}

/// An in-memory [ByteSource]: reads drain a queue, writes are recorded.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    input: VecDeque<u8>,
    written: Vec<u8>,
}

impl MemorySource {
    /// A source that will yield `bytes` and then run dry.
    pub fn new(bytes: impl Into<VecDeque<u8>>) -> Self {
        Self {
            input: bytes.into(),
            written: Vec::new(),
        }
    }

    /// Queues more bytes to be read.
    pub fn push(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    /// Everything written so far
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Bytes still waiting to be read
    pub fn remaining(&self) -> usize {
        self.input.len()
    }
}

impl ByteSource for MemorySource {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.input.pop_front())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if self.input.len() < buf.len() {
            self.input.clear();
            return Err(ErrorKind::UnexpectedEof.into());
        }
        let n = buf.len();
        for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = byte;
        }
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(data);
        Ok(())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.input.clear();
        Ok(())
    }
}
