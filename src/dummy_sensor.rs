//! Stand-ins for the real hardware, used by `--simulate` and by tests.
//!
//! [SimulatedSerial] behaves like the force/torque sensor on the other end
//! of a serial line: it boots, answers the setup handshake, and then streams
//! frames at a fixed rate. [SimulatedAdc] returns noisy constant voltages.

use crate::byte_source::ByteSource;
use crate::frame_codec;
use crate::handshake::BOOT_BANNER;
use crate::tactile_sensor::AdcSource;
use log::debug;
use rand::prelude::*;
use rand::rngs::StdRng;
use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::time::{Duration, Instant};

/// The real sensor streams at roughly this rate
const DEFAULT_FRAME_PERIOD: Duration = Duration::from_micros(1250);

/// Longest a read blocks waiting for the next frame, like a serial timeout
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// A simulated force/torque sensor behind a serial line.
pub struct SimulatedSerial {
    input: VecDeque<u8>,
    streaming: bool,
    channels: [f32; 6],
    noise: f32,
    garbage: f64,
    period: Duration,
    next_frame: Instant,
    timestamp_raw: u32,
    rng: StdRng,
}

impl Default for SimulatedSerial {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSerial {
    /// A sensor that has just powered up and reads zero on every channel.
    pub fn new() -> Self {
        let mut input = VecDeque::new();
        input.extend(format!("booting...{BOOT_BANNER}\r\n").bytes());
        Self {
            input,
            streaming: false,
            channels: [0.0; 6],
            noise: 0.0,
            garbage: 0.0,
            period: DEFAULT_FRAME_PERIOD,
            next_frame: Instant::now(),
            timestamp_raw: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// A sensor whose channels hold `channels` exactly.
    pub fn constant(channels: [f32; 6]) -> Self {
        Self {
            channels,
            ..Self::new()
        }
    }

    /// Adds uniform noise of up to `amplitude` to every channel.
    pub fn with_noise(mut self, amplitude: f32) -> Self {
        self.noise = amplitude.abs();
        self
    }

    /// Inserts a random stray byte before a frame with probability `p`.
    pub fn with_garbage(mut self, p: f64) -> Self {
        self.garbage = p.clamp(0.0, 1.0);
        self
    }

    /// Streams one frame every `period`.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Fixes the random sequence.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Queues the next frame once it is due, blocking for at most
    /// [READ_TIMEOUT]. Returns false if nothing was queued.
    fn produce(&mut self) -> bool {
        if !self.streaming {
            return false;
        }

        let now = Instant::now();
        if self.next_frame > now {
            let wait = self.next_frame - now;
            if wait > READ_TIMEOUT {
                spin_sleep::sleep(READ_TIMEOUT);
                return false;
            }
            spin_sleep::sleep(wait);
        }
        self.next_frame = self.next_frame.max(now) + self.period;

        if self.garbage > 0.0 && self.rng.gen_bool(self.garbage) {
            self.input.push_back(self.rng.gen());
        }

        let mut channels = self.channels;
        if self.noise > 0.0 {
            for channel in channels.iter_mut() {
                *channel += self.rng.gen_range(-self.noise..self.noise);
            }
        }
        self.timestamp_raw = self
            .timestamp_raw
            .wrapping_add(self.period.as_micros() as u32);

        let frame = frame_codec::encode(0, channels, self.timestamp_raw, 25.0);
        self.input.extend(frame);
        true
    }

    fn reply(&mut self, command: &str) {
        let letter = command.chars().next().unwrap_or('?');
        match letter {
            'C' => self.streaming = false,
            'R' => {
                self.streaming = true;
                self.next_frame = Instant::now();
            }
            _ => {}
        }
        debug!("simulated sensor got '{command}'");
        self.input.extend(format!("r,0,{letter},0\r\n").bytes());
    }
}

impl ByteSource for SimulatedSerial {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if self.input.is_empty() {
            self.produce();
        }
        Ok(self.input.pop_front())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        while self.input.len() < buf.len() {
            if !self.produce() {
                return Err(ErrorKind::TimedOut.into());
            }
        }
        let n = buf.len();
        for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = byte;
        }
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let command = String::from_utf8_lossy(data).into_owned();
        self.reply(command.trim());
        Ok(())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.input.clear();
        Ok(())
    }
}

/// A simulated ADC: each channel sits at a fixed voltage plus noise.
pub struct SimulatedAdc {
    levels: Vec<f64>,
    noise: f64,
    v_ref: f64,
    rng: StdRng,
}

impl SimulatedAdc {
    /// Channels read `levels[ch]` volts, give or take `noise`, clamped to
    /// `[0, v_ref]`. Channels past the end of `levels` read zero.
    pub fn new(levels: Vec<f64>, noise: f64, v_ref: f64) -> Self {
        Self {
            levels,
            noise: noise.abs(),
            v_ref,
            rng: StdRng::from_entropy(),
        }
    }

    /// Fixes the random sequence.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

impl AdcSource for SimulatedAdc {
    fn read(&mut self, channel: u8) -> io::Result<f64> {
        let level = self.levels.get(channel as usize).copied().unwrap_or(0.0);
        let jitter = if self.noise > 0.0 {
            self.rng.gen_range(-self.noise..self.noise)
        } else {
            0.0
        };
        Ok((level + jitter).clamp(0.0, self.v_ref))
    }
}
