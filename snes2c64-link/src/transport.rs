//! Request/response exchange over a [`ByteStream`].
//!
//! One exchange is: drop stale input, write the whole command frame in a
//! single call, then feed incoming bytes to a [`FrameDecoder`] until the
//! response carrying the command's sequence tag completes or the deadline
//! passes. Replies under any other tag belong to an earlier exchange that
//! gave up on them and are skipped. Bytes that arrive after the response in
//! the same read are discarded.

use std::io;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use snes2c64_proto::{
    Command, Frame, FrameBytes, FrameDecoder, FrameError, Opcode, Response, Serialize, Status,
    Tagged, MAX_FRAME_SIZE,
};

use crate::stream::{ByteStream, StreamError};

/// Failure of a single exchange, before it is tied to a request.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Malformed(FrameError),
    #[error("adapter reported {0}")]
    Rejected(Status),
    #[error("stream closed")]
    StreamClosed,
    #[error("stream I/O error: {0}")]
    Io(#[source] io::Error),
}

impl TransportError {
    /// True when the stream cannot be used for further exchanges.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StreamClosed | Self::Io(_))
    }
}

impl From<StreamError> for TransportError {
    fn from(err: StreamError) -> Self {
        match err {
            // Callers map a read timeout to the exchange deadline themselves.
            StreamError::TimedOut => Self::Io(io::ErrorKind::TimedOut.into()),
            StreamError::Closed => Self::StreamClosed,
            StreamError::Io(e) => Self::Io(e),
        }
    }
}

/// Frame-level view of a byte stream.
#[derive(Debug)]
pub struct FrameTransport<S: ByteStream> {
    stream: S,
    decoder: FrameDecoder,
    seq: u8,
}

impl<S: ByteStream> FrameTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::responses(),
            seq: 0,
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Tag of the last command sent; zero before the first.
    pub fn seq(&self) -> u8 {
        self.seq
    }

    /// Write `command` as one frame under a fresh sequence tag.
    pub fn send(&mut self, command: &Command) -> Result<(), TransportError> {
        let seq = self.seq.wrapping_add(1);
        let bytes: FrameBytes = Tagged::new(seq, *command)
            .serialize_to_vec()
            .map_err(|e| TransportError::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        self.seq = seq;
        trace!("-> {} #{seq} {:02X?}", command.opcode(), bytes.as_slice());
        self.stream.write_all(&bytes)?;
        Ok(())
    }

    /// Wait up to `timeout` for the response to the last command sent,
    /// which must be an `expected` request.
    ///
    /// The decoder is left idle whatever the outcome, so a partial frame
    /// never leaks into the next exchange.
    pub fn receive(&mut self, expected: Opcode, timeout: Duration) -> Result<Response, TransportError> {
        let result = self.receive_frame(timeout).and_then(|frame| accept(expected, &frame));
        self.decoder.reset();
        result
    }

    fn receive_frame(&mut self, timeout: Duration) -> Result<Frame, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; MAX_FRAME_SIZE];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout(timeout));
            }

            let n = match self.stream.read(&mut chunk, remaining) {
                Ok(0) => return Err(TransportError::StreamClosed),
                Ok(n) => n,
                Err(StreamError::TimedOut) => continue,
                Err(e) => return Err(e.into()),
            };
            trace!("<- {:02X?}", &chunk[..n]);

            for (i, &byte) in chunk[..n].iter().enumerate() {
                let Some(frame) = self.decoder.push(byte).map_err(TransportError::Malformed)? else {
                    continue;
                };
                if frame.seq != self.seq {
                    debug!(
                        "skipping late {} reply #{} while waiting for #{}",
                        frame.opcode, frame.seq, self.seq
                    );
                    continue;
                }
                let trailing = n - i - 1;
                if trailing > 0 {
                    trace!("discarding {trailing} bytes after response");
                }
                return Ok(frame);
            }
        }
    }

    /// Run one complete request/response exchange.
    pub fn exchange(&mut self, command: &Command, timeout: Duration) -> Result<Response, TransportError> {
        self.decoder.reset();
        self.stream.discard_input()?;
        self.send(command)?;
        self.receive(command.opcode(), timeout)
    }

    /// Release the stream.
    pub fn close(&mut self) {
        self.decoder.reset();
        self.stream.close();
    }
}

impl<S: ByteStream> Drop for FrameTransport<S> {
    fn drop(&mut self) {
        self.stream.close();
    }
}

fn accept(expected: Opcode, frame: &Frame) -> Result<Response, TransportError> {
    if frame.opcode != expected {
        warn!("expected {expected} response, got {}", frame.opcode);
        return Err(TransportError::Malformed(FrameError::UnexpectedOpcode {
            expected,
            actual: frame.opcode,
        }));
    }
    if !frame.status.is_ok() {
        return Err(TransportError::Rejected(frame.status));
    }
    Response::from_frame(frame).map_err(TransportError::Malformed)
}
