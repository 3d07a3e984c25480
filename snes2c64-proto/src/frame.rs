//! Wire frames exchanged with the adapter.
//!
//! # Layout (wire version 1)
//!
//! ```text
//! command : 0xA5 | opcode | seq | len | payload[len] | crc8
//! response: 0x5A | opcode | seq | status | len | payload[len] | crc8
//! ```
//!
//! `crc8` is CRC-8/SMBUS over every byte after the sync byte. `seq` is
//! chosen by the host per request and echoed by the adapter, so a reply
//! that arrives after its request timed out can never answer a later one.
//! Every constant of the physical layout lives in this module; the rest of
//! the stack only sees [`Command`], [`Response`] and [`Frame`].
//!
//! | opcode | command payload | response payload |
//! |---|---|---|
//! | `0x01` GET_VERSION | empty | 1-32 printable ASCII bytes |
//! | `0x02` READ_SLOT | `[slot]` | 10 map bytes |
//! | `0x03` WRITE_SLOT | `[slot, map[0..10]]` | empty |

use core::fmt;

use crate::codec::{self, MAP_LEN};
use crate::types::{GamepadMap, SlotIndex};

/// Revision of the byte layout described above.
pub const WIRE_VERSION: u8 = 1;

/// First byte of every host-to-adapter frame.
pub const COMMAND_SYNC: u8 = 0xA5;

/// First byte of every adapter-to-host frame.
pub const RESPONSE_SYNC: u8 = 0x5A;

/// Largest payload either side may send.
pub const MAX_PAYLOAD: usize = 32;

/// Sync, opcode, seq, length.
pub const COMMAND_HEADER_LEN: usize = 4;

/// Sync, opcode, seq, status, length.
pub const RESPONSE_HEADER_LEN: usize = 5;

/// Largest frame on the wire, header and checksum included.
pub const MAX_FRAME_SIZE: usize = RESPONSE_HEADER_LEN + MAX_PAYLOAD + 1;

/// Longest firmware version string.
pub const MAX_VERSION_LEN: usize = MAX_PAYLOAD;

/// Frame payload storage.
pub type Payload = heapless::Vec<u8, MAX_PAYLOAD>;

/// Firmware version as reported by the adapter.
pub type Version = heapless::String<MAX_VERSION_LEN>;

/// Request type carried in byte 1 of every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    GetVersion = 0x01,
    ReadSlot = 0x02,
    WriteSlot = 0x03,
}

impl Opcode {
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::GetVersion),
            0x02 => Some(Self::ReadSlot),
            0x03 => Some(Self::WriteSlot),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetVersion => "GET_VERSION",
            Self::ReadSlot => "READ_SLOT",
            Self::WriteSlot => "WRITE_SLOT",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome reported by the adapter in a response header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Ok,
    /// Slot byte outside `0..8`.
    InvalidSlot,
    /// Slot storage could not be written.
    StorageFailure,
    /// Opcode not implemented by the firmware.
    UnknownCommand,
    /// Any code this host does not know.
    Other(u8),
}

impl Status {
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Ok,
            0x01 => Self::InvalidSlot,
            0x02 => Self::StorageFailure,
            0x03 => Self::UnknownCommand,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Ok => 0x00,
            Self::InvalidSlot => 0x01,
            Self::StorageFailure => 0x02,
            Self::UnknownCommand => 0x03,
            Self::Other(code) => code,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::InvalidSlot => write!(f, "invalid slot"),
            Self::StorageFailure => write!(f, "storage failure"),
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::Other(code) => write!(f, "status {code:#04x}"),
        }
    }
}

/// Direction of a frame, which fixes its sync byte and header shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameKind {
    /// Host to adapter.
    Command,
    /// Adapter to host.
    Response,
}

impl FrameKind {
    #[inline]
    #[must_use]
    pub const fn sync(self) -> u8 {
        match self {
            Self::Command => COMMAND_SYNC,
            Self::Response => RESPONSE_SYNC,
        }
    }

    #[inline]
    #[must_use]
    pub const fn header_len(self) -> usize {
        match self {
            Self::Command => COMMAND_HEADER_LEN,
            Self::Response => RESPONSE_HEADER_LEN,
        }
    }
}

/// A checksum-verified frame whose payload has not been interpreted yet.
///
/// Command frames carry no status byte; they decode with [`Status::Ok`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub seq: u8,
    pub status: Status,
    pub payload: Payload,
}

impl Frame {
    /// A response frame reporting `status` with no payload.
    #[must_use]
    pub fn rejection(opcode: Opcode, seq: u8, status: Status) -> Self {
        Self {
            opcode,
            seq,
            status,
            payload: Payload::new(),
        }
    }
}

/// A message paired with the sequence tag it travels under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tagged<M> {
    pub seq: u8,
    pub message: M,
}

impl<M> Tagged<M> {
    #[must_use]
    pub const fn new(seq: u8, message: M) -> Self {
        Self { seq, message }
    }
}

/// Host request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    GetVersion,
    ReadSlot(SlotIndex),
    WriteSlot(SlotIndex, GamepadMap),
}

impl Command {
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::GetVersion => Opcode::GetVersion,
            Self::ReadSlot(_) => Opcode::ReadSlot,
            Self::WriteSlot(..) => Opcode::WriteSlot,
        }
    }

    /// Slot addressed by this command, if any.
    #[must_use]
    pub const fn slot(&self) -> Option<SlotIndex> {
        match self {
            Self::GetVersion => None,
            Self::ReadSlot(slot) | Self::WriteSlot(slot, _) => Some(*slot),
        }
    }

    /// Payload bytes for this command.
    #[must_use]
    pub fn payload(&self) -> Payload {
        let mut payload = Payload::new();
        match self {
            Self::GetVersion => {}
            Self::ReadSlot(slot) => {
                // Capacity is far above the largest command payload.
                let _ = payload.push(slot.get());
            }
            Self::WriteSlot(slot, map) => {
                let _ = payload.push(slot.get());
                let _ = payload.extend_from_slice(&codec::encode(map));
            }
        }
        payload
    }

    /// Interpret a decoded command frame (adapter side).
    ///
    /// # Errors
    ///
    /// [`FrameError::InvalidPayload`] when the payload length does not fit
    /// the opcode, [`FrameError::SlotIndexOutOfRange`] for a bad slot byte.
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        let payload = frame.payload.as_slice();
        let invalid = FrameError::InvalidPayload {
            opcode: frame.opcode,
            len: payload.len(),
        };
        match frame.opcode {
            Opcode::GetVersion if payload.is_empty() => Ok(Self::GetVersion),
            Opcode::ReadSlot => match payload {
                [slot] => Ok(Self::ReadSlot(parse_slot(*slot)?)),
                _ => Err(invalid),
            },
            Opcode::WriteSlot if payload.len() == 1 + MAP_LEN => {
                let slot = parse_slot(payload[0])?;
                let mut bytes = [0u8; MAP_LEN];
                bytes.copy_from_slice(&payload[1..]);
                Ok(Self::WriteSlot(slot, codec::decode(&bytes)))
            }
            _ => Err(invalid),
        }
    }
}

fn parse_slot(byte: u8) -> Result<SlotIndex, FrameError> {
    SlotIndex::new(byte).map_err(|_| FrameError::SlotIndexOutOfRange(byte))
}

/// Successful adapter reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Reply to GET_VERSION.
    Version(Version),
    /// Reply to READ_SLOT: the raw slot bytes, decoded by the caller.
    Slot([u8; MAP_LEN]),
    /// Reply to WRITE_SLOT.
    Ack,
}

impl Response {
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Version(_) => Opcode::GetVersion,
            Self::Slot(_) => Opcode::ReadSlot,
            Self::Ack => Opcode::WriteSlot,
        }
    }

    #[must_use]
    pub fn payload(&self) -> Payload {
        let mut payload = Payload::new();
        match self {
            Self::Version(version) => {
                let _ = payload.extend_from_slice(version.as_bytes());
            }
            Self::Slot(bytes) => {
                let _ = payload.extend_from_slice(bytes);
            }
            Self::Ack => {}
        }
        payload
    }

    /// Interpret the payload of a response frame whose status is OK.
    ///
    /// # Errors
    ///
    /// [`FrameError::InvalidPayload`] when the payload length does not fit
    /// the opcode, [`FrameError::InvalidVersion`] for a version string that
    /// is empty or not printable ASCII.
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        let payload = frame.payload.as_slice();
        match frame.opcode {
            Opcode::GetVersion => parse_version(payload).map(Self::Version),
            Opcode::ReadSlot if payload.len() == MAP_LEN => {
                let mut bytes = [0u8; MAP_LEN];
                bytes.copy_from_slice(payload);
                Ok(Self::Slot(bytes))
            }
            Opcode::WriteSlot if payload.is_empty() => Ok(Self::Ack),
            opcode => Err(FrameError::InvalidPayload {
                opcode,
                len: payload.len(),
            }),
        }
    }
}

fn parse_version(payload: &[u8]) -> Result<Version, FrameError> {
    if payload.is_empty() || !payload.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        return Err(FrameError::InvalidVersion);
    }
    let text = core::str::from_utf8(payload).map_err(|_| FrameError::InvalidVersion)?;
    let mut version = Version::new();
    version
        .push_str(text)
        .map_err(|()| FrameError::InvalidVersion)?;
    Ok(version)
}

/// Reasons a frame is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Opcode byte is not part of the protocol.
    UnknownOpcode(u8),
    /// Length byte exceeds [`MAX_PAYLOAD`].
    PayloadTooLong(u8),
    /// CRC-8 over the frame does not match its trailer.
    Checksum { expected: u8, actual: u8 },
    /// Response answers a different request than the one outstanding.
    UnexpectedOpcode { expected: Opcode, actual: Opcode },
    /// Payload length does not fit the opcode.
    InvalidPayload { opcode: Opcode, len: usize },
    /// Version reply is empty or not printable ASCII.
    InvalidVersion,
    /// Slot byte outside `0..8`.
    SlotIndexOutOfRange(u8),
    /// Input ended before a complete frame.
    Incomplete,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOpcode(op) => write!(f, "unknown opcode {op:#04x}"),
            Self::PayloadTooLong(len) => {
                write!(f, "payload length {len} exceeds {MAX_PAYLOAD}")
            }
            Self::Checksum { expected, actual } => {
                write!(f, "checksum mismatch: expected {expected:#04x}, got {actual:#04x}")
            }
            Self::UnexpectedOpcode { expected, actual } => {
                write!(f, "expected {expected} response, got {actual}")
            }
            Self::InvalidPayload { opcode, len } => {
                write!(f, "invalid {opcode} payload length {len}")
            }
            Self::InvalidVersion => write!(f, "invalid version string"),
            Self::SlotIndexOutOfRange(slot) => write!(f, "slot index {slot} out of range"),
            Self::Incomplete => write!(f, "incomplete frame"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{C64Target, SnesKey};

    fn frame(opcode: Opcode, payload: &[u8]) -> Frame {
        Frame {
            opcode,
            seq: 0,
            status: Status::Ok,
            payload: Payload::from_slice(payload).unwrap(),
        }
    }

    #[test]
    fn test_opcode_roundtrip() {
        for op in [Opcode::GetVersion, Opcode::ReadSlot, Opcode::WriteSlot] {
            assert_eq!(Opcode::from_u8(op.as_u8()), Some(op));
        }
        assert_eq!(Opcode::from_u8(0x00), None);
        assert_eq!(Opcode::from_u8(0x04), None);
    }

    #[test]
    fn test_status_codes() {
        assert!(Status::from_u8(0).is_ok());
        assert_eq!(Status::from_u8(2), Status::StorageFailure);
        assert_eq!(Status::from_u8(0x7F), Status::Other(0x7F));
        assert_eq!(Status::Other(0x7F).as_u8(), 0x7F);
    }

    #[test]
    fn test_write_slot_payload() {
        let slot = SlotIndex::new(3).unwrap();
        let map = GamepadMap::new().with(SnesKey::B, C64Target::Fire1);
        let cmd = Command::WriteSlot(slot, map);
        assert_eq!(
            cmd.payload().as_slice(),
            &[3, 0x10, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(Command::from_frame(&frame(Opcode::WriteSlot, &cmd.payload())), Ok(cmd));
    }

    #[test]
    fn test_command_rejects_bad_slot() {
        assert_eq!(
            Command::from_frame(&frame(Opcode::ReadSlot, &[8])),
            Err(FrameError::SlotIndexOutOfRange(8))
        );
    }

    #[test]
    fn test_command_rejects_bad_length() {
        assert_eq!(
            Command::from_frame(&frame(Opcode::GetVersion, &[1])),
            Err(FrameError::InvalidPayload {
                opcode: Opcode::GetVersion,
                len: 1
            })
        );
    }

    #[test]
    fn test_response_slot_requires_ten_bytes() {
        assert_eq!(
            Response::from_frame(&frame(Opcode::ReadSlot, &[0; 9])),
            Err(FrameError::InvalidPayload {
                opcode: Opcode::ReadSlot,
                len: 9
            })
        );
        assert_eq!(
            Response::from_frame(&frame(Opcode::ReadSlot, &[1; 10])),
            Ok(Response::Slot([1; 10]))
        );
    }

    #[test]
    fn test_response_version() {
        let response = Response::from_frame(&frame(Opcode::GetVersion, b"v1.2")).unwrap();
        match response {
            Response::Version(v) => assert_eq!(v.as_str(), "v1.2"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_response_version_rejects_garbage() {
        assert_eq!(
            Response::from_frame(&frame(Opcode::GetVersion, &[])),
            Err(FrameError::InvalidVersion)
        );
        assert_eq!(
            Response::from_frame(&frame(Opcode::GetVersion, &[b'v', 0xFF])),
            Err(FrameError::InvalidVersion)
        );
    }

    #[test]
    fn test_ack_must_be_empty() {
        assert_eq!(Response::from_frame(&frame(Opcode::WriteSlot, &[])), Ok(Response::Ack));
        assert!(Response::from_frame(&frame(Opcode::WriteSlot, &[0])).is_err());
    }
}
