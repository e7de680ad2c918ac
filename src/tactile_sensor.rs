//! The four-channel tactile array, read through an MCP3204 ADC on each tick.
//! The array's LEDs are switched by a separate enable line, which is held
//! high for as long as the sensor is open.

use crate::sensor::{ChannelSource, SensorError};
use log::warn;
use std::io::{self, ErrorKind};

/// Number of channels a tactile reading carries
pub const TACTILE_CHANNELS: usize = 4;

/// Full-scale count of a 12-bit conversion
const ADC_FULL_SCALE: f64 = 4095.0;

/// Yields a voltage per channel.
pub trait AdcSource: Send {
    /// Converts `channel` and returns the measured voltage.
    fn read(&mut self, channel: u8) -> io::Result<f64>;
}

/// A full-duplex SPI transfer: `buf` is sent and overwritten with the reply.
pub trait SpiBus: Send {
    /// Performs one transfer
    fn transfer(&mut self, buf: &mut [u8]) -> io::Result<()>;
}

/// A digital output line.
pub trait OutputPin: Send {
    /// Drives the line high or low.
    fn set(&mut self, high: bool) -> io::Result<()>;
}

/// The MCP3204 4-channel 12-bit ADC.
pub struct Mcp3204<B: SpiBus> {
    bus: B,
    v_ref: f64,
}

impl<B: SpiBus> Mcp3204<B> {
    /// Wraps `bus`. `v_ref` is the converter's reference voltage.
    pub fn new(bus: B, v_ref: f64) -> Self {
        Self { bus, v_ref }
    }
}

impl<B: SpiBus> AdcSource for Mcp3204<B> {
    fn read(&mut self, channel: u8) -> io::Result<f64> {
        if channel as usize >= TACTILE_CHANNELS {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("MCP3204 has no channel {channel}"),
            ));
        }

        // start bit, single-ended mode, then the channel number
        let mut buf = [0x06 | (channel >> 2), (channel & 0x03) << 6, 0x00];
        self.bus.transfer(&mut buf)?;

        let value = (((buf[1] & 0x0F) as u16) << 8) | buf[2] as u16;
        Ok(value as f64 / ADC_FULL_SCALE * self.v_ref)
    }
}

/// The tactile array: every channel's voltage as a fraction of `v_ref`.
pub struct TactileSensor<A: AdcSource> {
    adc: A,
    v_ref: f64,
    led: Option<Box<dyn OutputPin>>,
}

impl<A: AdcSource> TactileSensor<A> {
    /// Reads through `adc`, normalizing by `v_ref`.
    pub fn new(adc: A, v_ref: f64) -> Self {
        Self {
            adc,
            v_ref,
            led: None,
        }
    }

    /// Switches the LEDs on through `led`. They are switched off again when
    /// the sensor is dropped.
    pub fn with_led(mut self, mut led: Box<dyn OutputPin>) -> io::Result<Self> {
        led.set(true)?;
        self.led = Some(led);
        Ok(self)
    }
}

impl<A: AdcSource> Drop for TactileSensor<A> {
    fn drop(&mut self) {
        if let Some(led) = self.led.as_mut() {
            if let Err(e) = led.set(false) {
                warn!("could not switch the tactile LEDs off: {e}");
            }
        }
    }
}

impl<A: AdcSource> ChannelSource<TACTILE_CHANNELS> for TactileSensor<A> {
    fn read(&mut self) -> Result<[f64; TACTILE_CHANNELS], SensorError> {
        let mut values = [0.0; TACTILE_CHANNELS];
        for (channel, value) in values.iter_mut().enumerate() {
            *value = self.adc.read(channel as u8)? / self.v_ref;
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Answers every transfer with a fixed 12-bit count and remembers what
    /// it was sent.
    struct FakeBus {
        count: u16,
        sent: Vec<[u8; 3]>,
    }

    impl SpiBus for FakeBus {
        fn transfer(&mut self, buf: &mut [u8]) -> io::Result<()> {
            self.sent.push([buf[0], buf[1], buf[2]]);
            buf[0] = 0xFF;
            buf[1] = 0xF0 | (self.count >> 8) as u8;
            buf[2] = (self.count & 0xFF) as u8;
            Ok(())
        }
    }

    #[test]
    fn mcp3204_command_and_decode() {
        let bus = FakeBus {
            count: 4095,
            sent: Vec::new(),
        };
        let mut adc = Mcp3204::new(bus, 3.3);

        assert!((adc.read(0).unwrap() - 3.3).abs() < 1e-12);
        adc.read(3).unwrap();
        assert_eq!(adc.bus.sent, vec![[0x06, 0x00, 0x00], [0x06, 0xC0, 0x00]]);
    }

    #[test]
    fn mcp3204_rejects_missing_channel() {
        let bus = FakeBus {
            count: 0,
            sent: Vec::new(),
        };
        let mut adc = Mcp3204::new(bus, 3.3);
        assert_eq!(adc.read(4).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert!(adc.bus.sent.is_empty());
    }

    #[test]
    fn tactile_reading_is_fraction_of_vref() {
        let bus = FakeBus {
            count: 2048,
            sent: Vec::new(),
        };
        let mut sensor = TactileSensor::new(Mcp3204::new(bus, 3.3), 3.3);
        let reading = sensor.read().unwrap();
        for v in reading {
            assert!((v - 2048.0 / 4095.0).abs() < 1e-12);
        }
    }

    /// Records every level it is driven to.
    struct FakePin {
        levels: Arc<Mutex<Vec<bool>>>,
        fail: bool,
    }

    impl OutputPin for FakePin {
        fn set(&mut self, high: bool) -> io::Result<()> {
            if self.fail {
                return Err(ErrorKind::PermissionDenied.into());
            }
            self.levels.lock().unwrap().push(high);
            Ok(())
        }
    }

    struct ConstAdc(f64);

    impl AdcSource for ConstAdc {
        fn read(&mut self, _channel: u8) -> io::Result<f64> {
            Ok(self.0)
        }
    }

    #[test]
    fn led_is_on_while_open_and_off_after_drop() {
        let levels = Arc::new(Mutex::new(Vec::new()));
        let pin = FakePin {
            levels: Arc::clone(&levels),
            fail: false,
        };
        let mut sensor = TactileSensor::new(ConstAdc(1.65), 3.3)
            .with_led(Box::new(pin))
            .unwrap();
        assert_eq!(*levels.lock().unwrap(), vec![true]);

        assert_eq!(sensor.read().unwrap(), [0.5; TACTILE_CHANNELS]);
        drop(sensor);
        assert_eq!(*levels.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn led_failure_fails_setup() {
        let pin = FakePin {
            levels: Arc::default(),
            fail: true,
        };
        let err = TactileSensor::new(ConstAdc(1.0), 3.3)
            .with_led(Box::new(pin))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    struct DeadAdc;

    impl AdcSource for DeadAdc {
        fn read(&mut self, _channel: u8) -> io::Result<f64> {
            Err(ErrorKind::NotConnected.into())
        }
    }

    #[test]
    fn adc_failure_propagates() {
        let mut sensor = TactileSensor::new(DeadAdc, 3.3);
        assert!(matches!(sensor.read(), Err(SensorError::Io(_))));
    }
}
