//! Finds and keeps frame alignment in the force/torque sensor's byte stream.
//!
//! While [SyncState::Searching] the synchronizer looks at one byte at a time
//! for the header sentinel. A header candidate is only trusted once the
//! checksum of the following payload matches; a false candidate costs
//! exactly one byte, everything read after it is scanned again. Once
//! [SyncState::Locked], every frame must start right where the previous one
//! ended, and any surprise drops back to searching.

use crate::byte_source::{is_underrun, ByteSource};
use crate::frame_codec::{self, ForceTorqueFrame, CHECKSUM_LEN, FRAME_HEADER, PAYLOAD_LEN};
use log::{debug, info};
use std::collections::VecDeque;
use std::io::{self, ErrorKind};

const BODY_LEN: usize = PAYLOAD_LEN + CHECKSUM_LEN;

/// Whether the synchronizer trusts its frame alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Hunting for a header followed by a valid checksum
    Searching,
    /// Aligned with the frame boundaries
    Locked,
}

/// Running counters, useful for spotting a noisy line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Frames decoded and emitted
    pub frames: u64,
    /// Header candidates whose checksum did not match
    pub checksum_failures: u64,
    /// Times the synchronizer went from locked back to searching
    pub lock_losses: u64,
}

/// The stateful scanner. Feed it from a [ByteSource] with [FrameSynchronizer::poll].
#[derive(Debug)]
pub struct FrameSynchronizer {
    header: u8,
    state: SyncState,
    // bytes already pulled from the source that still need scanning
    pending: VecDeque<u8>,
    stats: SyncStats,
}

impl Default for FrameSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSynchronizer {
    /// A synchronizer looking for the standard `0xAA` header.
    pub fn new() -> Self {
        Self::with_header(FRAME_HEADER)
    }

    /// A synchronizer looking for a custom header sentinel.
    pub fn with_header(header: u8) -> Self {
        Self {
            header,
            state: SyncState::Searching,
            pending: VecDeque::with_capacity(BODY_LEN),
            stats: SyncStats::default(),
        }
    }

    /// Current alignment state
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Counters since construction
    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// True if bytes are buffered internally awaiting a rescan.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Makes one attempt at a frame. Returns `Ok(Some(frame))` when a frame
    /// with a matching checksum was decoded, `Ok(None)` when more bytes are
    /// needed, and `Err` only for hard I/O failures of the source.
    pub fn poll<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> io::Result<Option<ForceTorqueFrame>> {
        let Some(byte) = self.next_byte(source)? else {
            return Ok(None);
        };

        if byte != self.header {
            if self.state == SyncState::Locked {
                self.lose_lock("header mismatch");
            }
            return Ok(None);
        }

        let mut body = [0u8; BODY_LEN];
        if !self.fill(source, &mut body)? {
            if self.state == SyncState::Locked {
                self.lose_lock("short read");
            }
            return Ok(None);
        }

        let (payload, crc) = body.split_at(PAYLOAD_LEN);
        let expected = u16::from_le_bytes([crc[0], crc[1]]);
        let actual = frame_codec::checksum(payload);
        if actual != expected {
            self.stats.checksum_failures += 1;
            debug!("checksum mismatch: got {actual:#06x}, frame says {expected:#06x}");
            // slip by the header byte only
            for &b in body.iter().rev() {
                self.pending.push_front(b);
            }
            if self.state == SyncState::Locked {
                self.lose_lock("checksum mismatch");
            }
            return Ok(None);
        }

        let frame = frame_codec::decode(payload)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;

        if self.state == SyncState::Searching {
            info!("frame sync acquired after {} frames", self.stats.frames);
            self.state = SyncState::Locked;
        }
        self.stats.frames += 1;

        Ok(Some(frame))
    }

    fn lose_lock(&mut self, reason: &str) {
        debug!("frame sync lost: {reason}");
        self.stats.lock_losses += 1;
        self.state = SyncState::Searching;
    }

    fn next_byte<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> io::Result<Option<u8>> {
        match self.pending.pop_front() {
            Some(b) => Ok(Some(b)),
            None => source.read_byte(),
        }
    }

    /// Fills `buf` from the pending bytes and then the source. On an underrun
    /// the bytes taken from `pending` are put back and `Ok(false)` returned.
    fn fill<S: ByteSource + ?Sized>(&mut self, source: &mut S, buf: &mut [u8]) -> io::Result<bool> {
        let buffered = self.pending.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..buffered)) {
            *slot = byte;
        }
        if buffered == buf.len() {
            return Ok(true);
        }

        match source.read_exact(&mut buf[buffered..]) {
            Ok(()) => Ok(true),
            Err(e) if is_underrun(&e) => {
                for &b in buf[..buffered].iter().rev() {
                    self.pending.push_front(b);
                }
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
