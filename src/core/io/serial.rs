use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use crate::core::io::Transport;
use crate::prelude::*;

/// Standard baud rates accepted by [`SerialTransport`].
const STANDARD_BAUD_RATES: &[u32] = &[
    9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 460_800, 500_000, 576_000, 921_600,
    1_000_000, 1_152_000, 1_500_000, 2_000_000, 2_500_000, 3_000_000, 3_500_000, 4_000_000,
];

/// Serial line transport.
///
/// Opens a character device in raw 8-N-1 mode with a zero read timeout, so
/// reads return immediately when no data is pending. The device is
/// configured and restored by the underlying `serialport` crate.
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Creates a serial transport for the device at `path` running at
    /// `baud_rate`.
    ///
    /// The baud rate is validated on [`open`](Transport::open), not here.
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            port: None,
        }
    }

    /// Device path this transport attaches to.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("path", &self.path)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        if !STANDARD_BAUD_RATES.contains(&self.baud_rate) {
            return Err(Error::UnsupportedBaudRate(self.baud_rate));
        }

        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(Duration::ZERO)
            .open()?;

        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| Error::Transport("serial port is not open".to_string()))?;

        match port.read(buf) {
            Ok(bytes_read) => Ok(bytes_read),
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| Error::Transport("serial port is not open".to_string()))?;

        match port.write(buf) {
            Ok(bytes_written) => Ok(bytes_written),
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_standard_baud_rate() {
        let mut transport = SerialTransport::new("/dev/null", 31_337);
        match transport.open() {
            Err(Error::UnsupportedBaudRate(31_337)) => {}
            other => panic!("expected UnsupportedBaudRate, got {other:?}"),
        }
        assert!(!transport.is_open());
    }

    #[test]
    fn io_on_closed_port_fails() {
        let mut transport = SerialTransport::new("/dev/ttyUSB0", 57_600);
        let mut buf = [0u8; 16];
        assert!(transport.read(&mut buf).is_err());
        assert!(transport.write(&buf).is_err());
    }

    #[test]
    fn close_without_open_is_noop() {
        let mut transport = SerialTransport::new("/dev/ttyUSB0", 57_600);
        transport.close();
        assert!(!transport.is_open());
    }
}
