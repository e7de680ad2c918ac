//! One output line of a Linux GPIO character device as an [OutputPin].

use crate::tactile_sensor::OutputPin;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

const GPIOHANDLES_MAX: usize = 64;
const GPIOHANDLE_REQUEST_OUTPUT: u32 = 1 << 1;

/// `_IOWR(0xB4, 0x03, struct gpiohandle_request)`
const GPIO_GET_LINEHANDLE_IOCTL: u32 = 0xC16C_B403;
/// `_IOWR(0xB4, 0x09, struct gpiohandle_data)`
const GPIOHANDLE_SET_LINE_VALUES_IOCTL: u32 = 0xC040_B409;

/// Mirrors `struct gpiohandle_request` from `linux/gpio.h`.
#[repr(C)]
struct GpioHandleRequest {
    line_offsets: [u32; GPIOHANDLES_MAX],
    flags: u32,
    default_values: [u8; GPIOHANDLES_MAX],
    consumer_label: [u8; 32],
    lines: u32,
    fd: libc::c_int,
}

/// Mirrors `struct gpiohandle_data`.
#[repr(C)]
struct GpioHandleData {
    values: [u8; GPIOHANDLES_MAX],
}

/// A single GPIO line requested as an output. The kernel releases the line
/// when this is dropped.
#[derive(Debug)]
pub struct GpioLine {
    handle: OwnedFd,
    offset: u32,
}

impl GpioLine {
    /// Requests line `offset` of the chip at `chip` (e.g. `/dev/gpiochip0`)
    /// as an output, initially low.
    pub fn request_output(chip: impl AsRef<Path>, offset: u32) -> io::Result<Self> {
        let chip: File = OpenOptions::new().read(true).write(true).open(chip)?;

        let mut label = [0u8; 32];
        let name = env!("CARGO_PKG_NAME").as_bytes();
        label[..name.len()].copy_from_slice(name);

        let mut request = GpioHandleRequest {
            line_offsets: [0; GPIOHANDLES_MAX],
            flags: GPIOHANDLE_REQUEST_OUTPUT,
            default_values: [0; GPIOHANDLES_MAX],
            consumer_label: label,
            lines: 1,
            fd: -1,
        };
        request.line_offsets[0] = offset;

        // SAFETY: `request` matches the kernel's layout and lives across the
        // call; the kernel only writes `fd` back into it.
        let res = unsafe {
            libc::ioctl(
                chip.as_raw_fd(),
                GPIO_GET_LINEHANDLE_IOCTL as _,
                &mut request as *mut GpioHandleRequest,
            )
        };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        if request.fd < 0 {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("no handle returned for GPIO line {offset}"),
            ));
        }

        // SAFETY: the ioctl succeeded, so `fd` is a fresh descriptor we own.
        let handle = unsafe { OwnedFd::from_raw_fd(request.fd as RawFd) };
        Ok(Self { handle, offset })
    }

    /// The line's offset on its chip
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl OutputPin for GpioLine {
    fn set(&mut self, high: bool) -> io::Result<()> {
        let mut data = GpioHandleData {
            values: [0; GPIOHANDLES_MAX],
        };
        data.values[0] = high as u8;

        // SAFETY: `data` matches the kernel's layout and outlives the call.
        let res = unsafe {
            libc::ioctl(
                self.handle.as_raw_fd(),
                GPIOHANDLE_SET_LINE_VALUES_IOCTL as _,
                &mut data as *mut GpioHandleData,
            )
        };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioctl_structs_match_kernel_sizes() {
        assert_eq!(std::mem::size_of::<GpioHandleRequest>(), 364);
        assert_eq!(std::mem::size_of::<GpioHandleData>(), 64);
        assert_eq!(
            (GPIO_GET_LINEHANDLE_IOCTL >> 16) & 0x3FFF,
            std::mem::size_of::<GpioHandleRequest>() as u32
        );
    }

    #[test]
    fn missing_chip_fails_to_open() {
        assert!(GpioLine::request_output("/dev/definitely-not-a-gpiochip", 17).is_err());
    }
}
