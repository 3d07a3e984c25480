//! Incremental frame decoder.
//!
//! Bytes arrive from a serial line in arbitrary chunks, so [`FrameDecoder`]
//! is fed one byte at a time and yields a [`Frame`] once a complete,
//! checksum-valid frame has been seen. Until the expected sync byte shows up
//! every byte is dropped, which skips line noise and the tail of frames
//! left over from an aborted exchange.

use crate::crc::frame_checksum;
use crate::frame::{
    Frame, FrameError, FrameKind, Opcode, Payload, Status, MAX_FRAME_SIZE, MAX_PAYLOAD,
};

/// Byte-at-a-time decoder for one frame direction.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    kind: FrameKind,
    buffer: heapless::Vec<u8, MAX_FRAME_SIZE>,
}

impl FrameDecoder {
    #[must_use]
    pub const fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            buffer: heapless::Vec::new(),
        }
    }

    /// Decoder for adapter-to-host frames.
    #[must_use]
    pub const fn responses() -> Self {
        Self::new(FrameKind::Response)
    }

    /// Decoder for host-to-adapter frames.
    #[must_use]
    pub const fn commands() -> Self {
        Self::new(FrameKind::Command)
    }

    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// True when no partial frame is buffered.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Feed one byte.
    ///
    /// Returns `Ok(Some(frame))` when `byte` completes a frame and `Ok(None)`
    /// while more bytes are needed or the byte was skipped while hunting for
    /// the sync byte. The decoder is idle again after any `Some` or `Err`.
    ///
    /// # Errors
    ///
    /// [`FrameError::PayloadTooLong`] as soon as the length byte is out of
    /// range, [`FrameError::Checksum`] or [`FrameError::UnknownOpcode`] once
    /// the frame is complete.
    pub fn push(&mut self, byte: u8) -> Result<Option<Frame>, FrameError> {
        if self.buffer.is_empty() && byte != self.kind.sync() {
            return Ok(None);
        }

        if self.buffer.push(byte).is_err() {
            self.reset();
            return Err(FrameError::PayloadTooLong(byte));
        }

        let header_len = self.kind.header_len();
        if self.buffer.len() < header_len {
            return Ok(None);
        }

        let payload_len = self.buffer[header_len - 1];
        if usize::from(payload_len) > MAX_PAYLOAD {
            self.reset();
            return Err(FrameError::PayloadTooLong(payload_len));
        }

        if self.buffer.len() < header_len + usize::from(payload_len) + 1 {
            return Ok(None);
        }

        let result = self.finish(header_len);
        self.reset();
        result.map(Some)
    }

    /// Validate a complete buffered frame.
    fn finish(&self, header_len: usize) -> Result<Frame, FrameError> {
        let (body, trailer) = self.buffer.split_at(self.buffer.len() - 1);
        let actual = trailer[0];
        let expected = frame_checksum(body);
        if expected != actual {
            return Err(FrameError::Checksum { expected, actual });
        }

        let opcode = Opcode::from_u8(body[1]).ok_or(FrameError::UnknownOpcode(body[1]))?;
        let seq = body[2];
        let status = match self.kind {
            FrameKind::Command => Status::Ok,
            FrameKind::Response => Status::from_u8(body[3]),
        };
        let payload = Payload::from_slice(&body[header_len..])
            .map_err(|()| FrameError::PayloadTooLong(body[header_len - 1]))?;

        Ok(Frame {
            opcode,
            seq,
            status,
            payload,
        })
    }

    /// Decode the first complete frame found in `bytes`.
    ///
    /// # Errors
    ///
    /// Any error from [`push`](Self::push), or [`FrameError::Incomplete`]
    /// when `bytes` ends before a frame is complete.
    pub fn decode(kind: FrameKind, bytes: &[u8]) -> Result<Frame, FrameError> {
        let mut decoder = Self::new(kind);
        for &byte in bytes {
            if let Some(frame) = decoder.push(byte)? {
                return Ok(frame);
            }
        }
        Err(FrameError::Incomplete)
    }
}
