//! A Linux spidev character device as a [SpiBus].

use crate::tactile_sensor::SpiBus;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// `_IOW('k', 0, char[32])`: one `spi_ioc_transfer`
const SPI_IOC_MESSAGE_1: u32 = 0x4020_6B00;

/// Mirrors `struct spi_ioc_transfer` from `linux/spi/spidev.h`.
#[repr(C)]
#[derive(Debug, Default)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    pad: u8,
}

/// An open `/dev/spidevB.C` device.
#[derive(Debug)]
pub struct Spidev {
    file: File,
    speed_hz: u32,
}

impl Spidev {
    /// Opens the device at `path`, clocking transfers at `speed_hz`.
    pub fn open(path: impl AsRef<Path>, speed_hz: u32) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file, speed_hz })
    }
}

impl SpiBus for Spidev {
    fn transfer(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let tx = buf.to_vec();
        let xfer = SpiIocTransfer {
            tx_buf: tx.as_ptr() as u64,
            rx_buf: buf.as_mut_ptr() as u64,
            len: buf.len() as u32,
            speed_hz: self.speed_hz,
            bits_per_word: 8,
            ..SpiIocTransfer::default()
        };

        // SAFETY: both buffers outlive the call and are `len` bytes long, and
        // `xfer` matches the kernel's layout for a single transfer.
        let res = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                SPI_IOC_MESSAGE_1 as _,
                &xfer as *const SpiIocTransfer,
            )
        };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
