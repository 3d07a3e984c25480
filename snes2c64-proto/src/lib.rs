//! Gamepad-map codec and serial wire framing for the SNES-to-C64 adapter.
//!
//! This crate provides everything needed to talk to the adapter at the byte
//! level, without doing any I/O:
//!
//! - **Types**: structured slot contents
//!   - [`GamepadMap`] - C64 targets driven by each of the ten SNES keys
//!   - [`SnesKey`], [`C64Target`], [`C64Targets`] - the two sides of a mapping
//!   - [`SlotIndex`] - a slot number that is always in `0..8`
//!
//! - **Codec**: [`codec::encode`], [`codec::decode`], [`codec::is_empty`]
//!
//! - **Frames**: [`Command`], [`Response`], [`Frame`] and the layout constants
//!
//! - **Serialization**: [`Serialize`] writes one complete frame
//!
//! - **Parsing**: [`FrameDecoder`] reassembles frames from a byte stream
//!
//! # Protocol Format
//!
//! ```text
//! command : 0xA5 | opcode | seq | len | payload[len] | crc8
//! response: 0x5A | opcode | seq | status | len | payload[len] | crc8
//! ```
//!
//! The host picks `seq` for each command and the adapter echoes it, so a
//! reply can be matched to the request that caused it. The checksum is
//! CRC-8/SMBUS over every byte after the sync byte. See [`frame`] for the
//! opcode table.
//!
//! # Example
//!
//! ```
//! use snes2c64_proto::{
//!     codec, C64Target, Command, FrameDecoder, FrameKind, GamepadMap, Serialize, SlotIndex,
//!     SnesKey, Tagged,
//! };
//!
//! let map = GamepadMap::new()
//!     .with(SnesKey::B, C64Target::Fire1)
//!     .with(SnesKey::Up, C64Target::JoyUp);
//! assert_eq!(codec::decode(&codec::encode(&map)), map);
//!
//! let cmd = Command::WriteSlot(SlotIndex::new(3).unwrap(), map);
//! let mut buf = [0u8; 64];
//! let len = Tagged::new(1, cmd).serialize(&mut buf).unwrap();
//!
//! let frame = FrameDecoder::decode(FrameKind::Command, &buf[..len]).unwrap();
//! assert_eq!(Command::from_frame(&frame), Ok(cmd));
//! ```
//!
//! # Features
//!
//! - **`std`**: `std::error::Error` impls for the error types
//! - **`defmt`**: Enable defmt formatting (for adapter firmware logging)
//!
//! # No-std Support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations, so the
//! adapter firmware can share it with the host.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod codec;
pub mod crc;
pub mod frame;
pub mod parser;
pub mod serialize;
pub mod types;

// Re-export types at crate root for convenience
pub use codec::{KNOWN_TARGET_MASK, MAP_LEN};
pub use crc::{calculate_crc8, frame_checksum, Crc8Digest};
pub use frame::{
    Command, Frame, FrameError, FrameKind, Opcode, Payload, Response, Status, Tagged, Version,
    COMMAND_SYNC, MAX_FRAME_SIZE, MAX_PAYLOAD, RESPONSE_SYNC, WIRE_VERSION,
};
pub use parser::FrameDecoder;
pub use serialize::{serialize_frame, FrameBytes, Serialize, SerializeError};
pub use types::{
    C64Target, C64Targets, GamepadMap, NameError, SlotIndex, SlotIndexOutOfRange, SnesKey,
    KEY_COUNT, SLOT_COUNT,
};
