//! Frame serialization.
//!
//! [`Serialize`] writes a [`Tagged`] [`Command`] or [`Response`] as one
//! complete frame (sync byte, header, payload, CRC-8) into a caller-provided
//! buffer, so a transport can hand the whole frame to the stream in a single
//! write.
//!
//! # Example
//!
//! ```
//! use snes2c64_proto::{Command, Serialize, SlotIndex, Tagged, COMMAND_SYNC};
//!
//! let slot = SlotIndex::new(2).unwrap();
//! let mut buf = [0u8; 64];
//! let len = Tagged::new(7, Command::ReadSlot(slot)).serialize(&mut buf).unwrap();
//! assert_eq!(&buf[..len - 1], &[COMMAND_SYNC, 0x02, 7, 0x01, 0x02]);
//! ```

use core::fmt;

use crate::crc::Crc8Digest;
use crate::frame::{Command, Frame, FrameKind, Response, Status, Tagged, MAX_FRAME_SIZE};

/// Buffer writer that accumulates the CRC-8 of everything after the sync byte.
struct SerializeBuf<'a> {
    buf: &'a mut [u8],
    pos: usize,
    crc: Crc8Digest,
}

impl<'a> SerializeBuf<'a> {
    #[inline]
    fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            crc: Crc8Digest::new(),
        }
    }

    /// Write a byte without checksumming (sync byte).
    #[inline]
    fn write_raw(&mut self, byte: u8) {
        self.buf[self.pos] = byte;
        self.pos += 1;
    }

    #[inline]
    fn write(&mut self, byte: u8) {
        self.buf[self.pos] = byte;
        self.crc.update(byte);
        self.pos += 1;
    }

    #[inline]
    fn write_slice(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.crc.update_slice(bytes);
        self.pos = end;
    }

    /// Append the checksum and return the frame length.
    #[inline]
    fn finalize(self) -> usize {
        let checksum = self.crc.finalize();
        self.buf[self.pos] = checksum;
        self.pos + 1
    }
}

/// Error type for serialization operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SerializeError {
    /// The output buffer is too small to hold the frame.
    BufferTooSmall,
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall => write!(f, "buffer too small"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SerializeError {}

/// Write `frame` in the layout of `kind`.
///
/// Command frames have no status byte, so `frame.status` is ignored for them.
///
/// # Errors
///
/// Returns [`SerializeError::BufferTooSmall`] if `buf` cannot hold the frame.
pub fn serialize_frame(kind: FrameKind, frame: &Frame, buf: &mut [u8]) -> Result<usize, SerializeError> {
    let len = kind.header_len() + frame.payload.len() + 1;
    if buf.len() < len {
        return Err(SerializeError::BufferTooSmall);
    }

    let mut sb = SerializeBuf::new(buf);
    sb.write_raw(kind.sync());
    sb.write(frame.opcode.as_u8());
    sb.write(frame.seq);
    if kind == FrameKind::Response {
        sb.write(frame.status.as_u8());
    }
    // Payload is bounded by MAX_PAYLOAD, which fits in a byte.
    sb.write(frame.payload.len() as u8);
    sb.write_slice(&frame.payload);
    Ok(sb.finalize())
}

/// Extension trait for writing protocol messages as frames.
pub trait Serialize {
    /// Serialize to the provided buffer.
    ///
    /// Returns the number of bytes written on success.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError::BufferTooSmall`] if the buffer is not large enough.
    fn serialize(&self, buf: &mut [u8]) -> Result<usize, SerializeError>;

    /// Serialize to a `heapless::Vec`.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError::BufferTooSmall`] if `N` is not large enough.
    fn serialize_to_vec<const N: usize>(&self) -> Result<heapless::Vec<u8, N>, SerializeError> {
        let mut vec = heapless::Vec::new();
        vec.resize(N, 0)
            .map_err(|()| SerializeError::BufferTooSmall)?;
        let len = self.serialize(&mut vec)?;
        vec.truncate(len);
        Ok(vec)
    }
}

impl Serialize for Tagged<Command> {
    fn serialize(&self, buf: &mut [u8]) -> Result<usize, SerializeError> {
        let frame = Frame {
            opcode: self.message.opcode(),
            seq: self.seq,
            status: Status::Ok,
            payload: self.message.payload(),
        };
        serialize_frame(FrameKind::Command, &frame, buf)
    }
}

impl Serialize for Tagged<Response> {
    fn serialize(&self, buf: &mut [u8]) -> Result<usize, SerializeError> {
        let frame = Frame {
            opcode: self.message.opcode(),
            seq: self.seq,
            status: Status::Ok,
            payload: self.message.payload(),
        };
        serialize_frame(FrameKind::Response, &frame, buf)
    }
}

/// Serialized frame sized for the largest possible message.
pub type FrameBytes = heapless::Vec<u8, MAX_FRAME_SIZE>;
