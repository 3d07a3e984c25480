//! Byte stream abstraction.
//!
//! [`ByteStream`] is the seam between the session logic and the physical
//! link. The host binary implements it for a serial port; the `sim` feature
//! implements it for an in-process adapter model.

use std::io;
use std::time::Duration;

/// Error type for stream operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Nothing arrived within the read timeout.
    #[error("read timed out")]
    TimedOut,
    /// The other end went away (cable pulled, device reset, port closed).
    #[error("stream closed")]
    Closed,
    /// Any other I/O failure.
    #[error(transparent)]
    Io(io::Error),
}

impl StreamError {
    /// True when the stream cannot be used any more.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::TimedOut)
    }
}

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::TimedOut,
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => Self::Closed,
            _ => Self::Io(err),
        }
    }
}

/// Bidirectional byte stream to one adapter.
///
/// Implementations must be usable from a thread other than the one that
/// opened them, hence the `Send` bound.
pub trait ByteStream: Send {
    /// Write every byte of `bytes` or fail.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), StreamError>;

    /// Read at least one byte into `buf`, waiting up to `timeout`.
    ///
    /// Returns the number of bytes read, which is never zero on success.
    /// [`StreamError::TimedOut`] means nothing arrived in time and the stream
    /// is still usable.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, StreamError>;

    /// Drop any bytes that have been received but not read yet.
    fn discard_input(&mut self) -> Result<(), StreamError>;

    /// Release the underlying port. Calling this more than once is a no-op.
    fn close(&mut self);
}

impl<T: ByteStream + ?Sized> ByteStream for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        (**self).write_all(bytes)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, StreamError> {
        (**self).read(buf, timeout)
    }

    fn discard_input(&mut self) -> Result<(), StreamError> {
        (**self).discard_input()
    }

    fn close(&mut self) {
        (**self).close();
    }
}

/// Factory for streams addressed by a port name such as `/dev/ttyUSB0`.
pub trait PortOpener {
    type Stream: ByteStream + 'static;

    /// Open `port`.
    fn open(&self, port: &str) -> Result<Self::Stream, StreamError>;
}
