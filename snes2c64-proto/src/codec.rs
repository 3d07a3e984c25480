//! Conversion between [`GamepadMap`] and the adapter's 10-byte slot format.
//!
//! Byte `n` of a slot belongs to the SNES key with index `n`
//! ([`SnesKey::ALL`] order). Each byte is a bitmask of [`C64Target`] bits.
//!
//! Decoding is lenient: bits that no known target uses are dropped instead
//! of rejected, so a host keeps working against firmware that defines
//! additional targets. Encoding never produces such bits.

use crate::types::{C64Target, C64Targets, GamepadMap, SnesKey, KEY_COUNT};

/// Length of one encoded slot.
pub const MAP_LEN: usize = KEY_COUNT;

/// Wire bits that correspond to a known target.
pub const KNOWN_TARGET_MASK: u8 = C64Targets::ALL.bits();

/// Encode a map into slot bytes.
#[must_use]
pub fn encode(map: &GamepadMap) -> [u8; MAP_LEN] {
    let mut bytes = [0u8; MAP_LEN];
    for (key, targets) in map.iter() {
        bytes[key.index()] = targets.iter().fold(0, |acc, target| acc | target.bit());
    }
    bytes
}

/// Decode slot bytes into a map, ignoring unknown bits.
#[must_use]
pub fn decode(bytes: &[u8; MAP_LEN]) -> GamepadMap {
    let mut map = GamepadMap::EMPTY;
    for key in SnesKey::ALL {
        let byte = bytes[key.index()] & KNOWN_TARGET_MASK;
        for target in C64Target::ALL {
            if byte & target.bit() != 0 {
                map.set(key, target, true);
            }
        }
    }
    map
}

/// True iff every encoded byte is zero.
///
/// Slot pickers use this to mark a slot as unused.
#[must_use]
pub fn is_empty(map: &GamepadMap) -> bool {
    encode(map).iter().all(|&b| b == 0)
}
