//! Encoding and decoding of the force/torque sensor's binary frame.
//!
//! On the wire a frame is a one byte header sentinel, a 34 byte
//! little-endian payload, and a little-endian CRC-16/X-25 of the payload:
//!
//! ```text
//! 0xAA | status u16 | fx fy fz mx my mz f32 | timestamp u32 | temperature f32 | crc u16
//! ```

use std::fmt;

/// The byte that starts every frame
pub const FRAME_HEADER: u8 = 0xAA;
/// Bytes of payload following the header
pub const PAYLOAD_LEN: usize = 34;
/// Bytes of trailing checksum
pub const CHECKSUM_LEN: usize = 2;
/// A whole frame, header to checksum
pub const FRAME_LEN: usize = 1 + PAYLOAD_LEN + CHECKSUM_LEN;

/// Seconds per tick of the sensor's timestamp counter
const TIMESTAMP_SCALE: f32 = 1e-6;

/// One decoded force/torque sample. Only [decode] builds these.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceTorqueFrame {
    status: u16,
    channels: [f32; 6],
    timestamp_raw: u32,
    temperature: f32,
}

impl ForceTorqueFrame {
    /// Status flags reported by the sensor
    pub fn status(&self) -> u16 {
        self.status
    }

    /// `[fx, fy, fz, mx, my, mz]`
    pub fn channels(&self) -> [f32; 6] {
        self.channels
    }

    /// `[fx, fy, fz]`
    pub fn force(&self) -> [f32; 3] {
        [self.channels[0], self.channels[1], self.channels[2]]
    }

    /// `[mx, my, mz]`
    pub fn torque(&self) -> [f32; 3] {
        [self.channels[3], self.channels[4], self.channels[5]]
    }

    /// Sensor timestamp in seconds
    pub fn timestamp(&self) -> f32 {
        self.timestamp_raw as f32 * TIMESTAMP_SCALE
    }

    /// Sensor timestamp in raw counter ticks (microseconds)
    pub fn timestamp_raw(&self) -> u32 {
        self.timestamp_raw
    }

    /// Sensor temperature
    pub fn temperature(&self) -> f32 {
        self.temperature
    }
}

/// What can go wrong turning bytes into a [ForceTorqueFrame].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// The caller handed over fewer bytes than a payload
    ShortRead {
        /// Bytes needed
        expected: usize,
        /// Bytes given
        actual: usize,
    },
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::ShortRead { expected, actual } => {
                write!(f, "short read: expected {expected} payload bytes, got {actual}")
            }
        }
    }
}

impl std::error::Error for FramingError {}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn le_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_bits(le_u32(bytes, at))
}

/// Decodes a payload (the 34 bytes between header and checksum). Bytes past
/// the payload are ignored.
pub fn decode(payload: &[u8]) -> Result<ForceTorqueFrame, FramingError> {
    if payload.len() < PAYLOAD_LEN {
        return Err(FramingError::ShortRead {
            expected: PAYLOAD_LEN,
            actual: payload.len(),
        });
    }

    let mut channels = [0.0; 6];
    for (i, channel) in channels.iter_mut().enumerate() {
        *channel = le_f32(payload, 2 + 4 * i);
    }

    Ok(ForceTorqueFrame {
        status: le_u16(payload, 0),
        channels,
        timestamp_raw: le_u32(payload, 26),
        temperature: le_f32(payload, 30),
    })
}

/// CRC-16/X-25 (reflected 0x1021, init and xorout 0xFFFF) of `payload`.
pub fn checksum(payload: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in payload {
        crc ^= byte as u16;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0x8408
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

/// Builds a complete wire frame, header and checksum included.
pub fn encode(status: u16, channels: [f32; 6], timestamp_raw: u32, temperature: f32) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = FRAME_HEADER;

    let payload = &mut frame[1..1 + PAYLOAD_LEN];
    payload[0..2].copy_from_slice(&status.to_le_bytes());
    for (i, channel) in channels.iter().enumerate() {
        payload[2 + 4 * i..6 + 4 * i].copy_from_slice(&channel.to_le_bytes());
    }
    payload[26..30].copy_from_slice(&timestamp_raw.to_le_bytes());
    payload[30..34].copy_from_slice(&temperature.to_le_bytes());

    let crc = checksum(&frame[1..1 + PAYLOAD_LEN]);
    frame[1 + PAYLOAD_LEN..].copy_from_slice(&crc.to_le_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_check_value() {
        assert_eq!(checksum(b"123456789"), 0x906E);
    }

    #[test]
    fn crc_catches_every_single_bit_flip() {
        let frame = encode(0x0102, [1.0, -2.0, 3.5, 0.25, -0.125, 9.0], 123_456, 31.5);
        let payload = &frame[1..1 + PAYLOAD_LEN];
        let reference = checksum(payload);
        assert_eq!(reference, checksum(payload));

        for bit in 0..PAYLOAD_LEN * 8 {
            let mut flipped = payload.to_vec();
            flipped[bit / 8] ^= 1 << (bit % 8);
            assert_ne!(checksum(&flipped), reference, "bit {bit}");
        }
    }

    #[test]
    fn decode_reads_little_endian_fields() {
        let frame = encode(0xBEEF, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2_500_000, 24.75);
        let decoded = decode(&frame[1..1 + PAYLOAD_LEN]).unwrap();

        assert_eq!(frame[1], 0xEF);
        assert_eq!(frame[2], 0xBE);
        assert_eq!(decoded.status(), 0xBEEF);
        assert_eq!(decoded.force(), [1.0, 2.0, 3.0]);
        assert_eq!(decoded.torque(), [4.0, 5.0, 6.0]);
        assert_eq!(decoded.timestamp_raw(), 2_500_000);
        assert!((decoded.timestamp() - 2.5).abs() < 1e-6);
        assert_eq!(decoded.temperature(), 24.75);
    }

    #[test]
    fn trailing_checksum_is_little_endian() {
        let frame = encode(0, [0.0; 6], 0, 0.0);
        let crc = checksum(&frame[1..1 + PAYLOAD_LEN]);
        assert_eq!(frame[FRAME_LEN - 2], (crc & 0xFF) as u8);
        assert_eq!(frame[FRAME_LEN - 1], (crc >> 8) as u8);
    }

    #[test]
    fn short_payload_is_rejected() {
        assert_eq!(
            decode(&[0u8; 10]),
            Err(FramingError::ShortRead {
                expected: PAYLOAD_LEN,
                actual: 10
            })
        );
    }
}
