//! Frame trailer checksum.
//!
//! The last byte of every frame is CRC-8/SMBUS (poly 0x07, init 0, no
//! reflection) over the opcode, sequence tag, status (responses only),
//! length and payload. The sync byte is left out, so a frame whose sync was
//! matched on a stray byte still fails the check on the bytes that follow.
//!
//! [`frame_checksum`] checks a buffered frame on receive;
//! [`Crc8Digest`] accumulates the same value while a frame is written out.

use crc::{Crc, CRC_8_SMBUS};

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// CRC-8/SMBUS of `data`.
#[inline]
#[must_use]
pub fn calculate_crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}

/// Trailer value for a frame, given every byte before the trailer.
///
/// `frame` starts at the sync byte, which does not count.
#[must_use]
pub fn frame_checksum(frame: &[u8]) -> u8 {
    calculate_crc8(frame.get(1..).unwrap_or_default())
}

/// Running trailer checksum fed by the frame writer, one field at a time.
pub struct Crc8Digest {
    digest: crc::Digest<'static, u8>,
}

impl Crc8Digest {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            digest: CRC8.digest(),
        }
    }

    #[inline]
    pub fn update(&mut self, byte: u8) {
        self.digest.update(&[byte]);
    }

    #[inline]
    pub fn update_slice(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    #[inline]
    #[must_use]
    pub fn finalize(self) -> u8 {
        self.digest.finalize()
    }
}

impl Default for Crc8Digest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{COMMAND_SYNC, RESPONSE_SYNC};

    #[test]
    fn test_crc8_check_value() {
        // Catalogue check value for CRC-8/SMBUS
        assert_eq!(calculate_crc8(b"123456789"), 0xF4);
    }

    #[test]
    fn test_frame_checksum_ignores_sync() {
        let body = [0x02, 0x11, 0x01, 0x04];
        let mut command = [COMMAND_SYNC; 5];
        command[1..].copy_from_slice(&body);
        let mut response = [RESPONSE_SYNC; 5];
        response[1..].copy_from_slice(&body);

        assert_eq!(frame_checksum(&command), calculate_crc8(&body));
        assert_eq!(frame_checksum(&command), frame_checksum(&response));
        assert_eq!(frame_checksum(&[]), 0x00);
    }

    #[test]
    fn test_header_fields_change_the_trailer() {
        // Same command under two tags must not share a trailer.
        let a = frame_checksum(&[COMMAND_SYNC, 0x02, 0x01, 0x01, 0x03]);
        let b = frame_checksum(&[COMMAND_SYNC, 0x02, 0x02, 0x01, 0x03]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_digest_matches_frame_checksum() {
        // READ_SLOT reply header (opcode, seq, status, len) then a slot map
        let header = [0x02, 0x05, 0x00, 0x0A];
        let payload = [0x10, 0, 0x01, 0, 0, 0, 0, 0, 0, 0x80];

        let mut whole = [0u8; 15];
        whole[0] = RESPONSE_SYNC;
        whole[1..5].copy_from_slice(&header);
        whole[5..].copy_from_slice(&payload);

        let mut digest = Crc8Digest::new();
        for &b in &header {
            digest.update(b);
        }
        digest.update_slice(&payload);

        assert_eq!(digest.finalize(), frame_checksum(&whole));
    }
}
