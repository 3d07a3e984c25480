//! Serial port backend for the link.
//!
//! The adapter enumerates as a USB CDC serial device. Finding the right port
//! name is left to the caller.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::debug;
use serialport::{ClearBuffer, SerialPort};
use snes2c64_link::{ByteStream, PortOpener, StreamError};

/// Default line speed of the adapter's UART.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Timeout applied when the port is opened. Reads override it per call.
const OPEN_TIMEOUT: Duration = Duration::from_millis(100);

/// Opens serial ports by name (`/dev/ttyACM0`, `COM3`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialOpener {
    pub baud_rate: u32,
}

impl Default for SerialOpener {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl SerialOpener {
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }
}

impl PortOpener for SerialOpener {
    type Stream = SerialStream;

    fn open(&self, port: &str) -> Result<SerialStream, StreamError> {
        let handle = serialport::new(port, self.baud_rate)
            .timeout(OPEN_TIMEOUT)
            .open()
            .map_err(|err| StreamError::Io(io::Error::from(err)))?;
        debug!("opened {port} at {} baud", self.baud_rate);
        Ok(SerialStream {
            name: port.to_owned(),
            port: Some(handle),
        })
    }
}

/// An open serial port. Closing drops the OS handle.
pub struct SerialStream {
    name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialStream {
    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, StreamError> {
        self.port.as_mut().ok_or(StreamError::Closed)
    }
}

impl ByteStream for SerialStream {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, StreamError> {
        let port = self.port()?;
        port.set_timeout(timeout)
            .map_err(|err| StreamError::Io(io::Error::from(err)))?;
        match port.read(buf) {
            Ok(0) => Err(StreamError::Closed),
            Ok(n) => Ok(n),
            Err(err) => Err(err.into()),
        }
    }

    fn discard_input(&mut self) -> Result<(), StreamError> {
        self.port()?
            .clear(ClearBuffer::Input)
            .map_err(|err| StreamError::Io(io::Error::from(err)))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("closed {}", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_baud_rate() {
        assert_eq!(SerialOpener::default().baud_rate, 115_200);
    }

    #[test]
    fn test_missing_port_fails_to_open() {
        let err = SerialOpener::default()
            .open("/dev/snes2c64-does-not-exist")
            .err()
            .unwrap();
        assert!(matches!(err, StreamError::Io(_) | StreamError::Closed));
    }
}
