use std::io::{Read, Write};
use std::time::Duration;

use anyhow::{Result, anyhow};
use hidapi::HidDevice;
use serialport::SerialPort;

/// Byte-level transport used by the strip drivers.
///
/// Both hidapi and serialport handles satisfy this, which keeps the drivers
/// testable against mocks.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceIo: Send + 'static {
    fn write(&mut self, buf: &[u8]) -> Result<usize>;
    fn read(&mut self, buf: &mut [u8], timeout_ms: u64) -> Result<usize>;
}

impl DeviceIo for HidDevice {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        HidDevice::write(self, buf).map_err(|e| anyhow!("{e}"))
    }

    fn read(&mut self, buf: &mut [u8], timeout_ms: u64) -> Result<usize> {
        HidDevice::read_timeout(self, buf, timeout_ms as i32).map_err(|e| anyhow!("{e}"))
    }
}

impl DeviceIo for Box<dyn SerialPort> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Write::write_all(self, buf)
            .and_then(|()| self.flush())
            .map(|()| buf.len())
            .map_err(|e| anyhow!("{e}"))
    }

    fn read(&mut self, buf: &mut [u8], timeout_ms: u64) -> Result<usize> {
        self.set_timeout(Duration::from_millis(timeout_ms))?;
        match Read::read(self, buf) {
            Ok(n) => Ok(n),
            // A timeout just means the device had nothing to say.
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(anyhow!("{e}")),
        }
    }
}
