//! Property tests for the slot codec and frame round trips.

use proptest::prelude::*;
use snes2c64_proto::{
    codec, C64Targets, Command, FrameDecoder, FrameKind, GamepadMap, Response, Serialize,
    SlotIndex, SnesKey, Tagged, KNOWN_TARGET_MASK, MAP_LEN,
};

fn any_map() -> impl Strategy<Value = GamepadMap> {
    prop::array::uniform10(any::<u8>()).prop_map(|bits| {
        let mut map = GamepadMap::new();
        for key in SnesKey::ALL {
            map.set_targets(key, C64Targets::from_bits_truncate(bits[key.index()]));
        }
        map
    })
}

fn any_slot() -> impl Strategy<Value = SlotIndex> {
    (0u8..8).prop_map(|i| SlotIndex::new(i).unwrap())
}

proptest! {
    #[test]
    fn decode_inverts_encode(map in any_map()) {
        prop_assert_eq!(codec::decode(&codec::encode(&map)), map);
    }

    #[test]
    fn encode_inverts_decode_on_known_bits(bytes in prop::array::uniform10(any::<u8>())) {
        let mut masked = [0u8; MAP_LEN];
        for (dst, src) in masked.iter_mut().zip(bytes.iter()) {
            *dst = src & KNOWN_TARGET_MASK;
        }
        prop_assert_eq!(codec::encode(&codec::decode(&masked)), masked);
    }

    #[test]
    fn is_empty_iff_no_bit_set(map in any_map()) {
        let any_set = codec::encode(&map).iter().any(|&b| b != 0);
        prop_assert_eq!(codec::is_empty(&map), !any_set);
    }

    #[test]
    fn write_slot_frame_roundtrip(slot in any_slot(), map in any_map(), seq in any::<u8>()) {
        let cmd = Command::WriteSlot(slot, map);
        let mut buf = [0u8; 64];
        let len = Tagged::new(seq, cmd).serialize(&mut buf).unwrap();
        let frame = FrameDecoder::decode(FrameKind::Command, &buf[..len]).unwrap();
        prop_assert_eq!(frame.seq, seq);
        prop_assert_eq!(Command::from_frame(&frame), Ok(cmd));
    }

    #[test]
    fn slot_response_survives_leading_noise(
        noise in prop::collection::vec(any::<u8>().prop_filter("not sync", |b| *b != snes2c64_proto::RESPONSE_SYNC), 0..16),
        bytes in prop::array::uniform10(any::<u8>()),
    ) {
        let mut wire = noise.clone();
        let mut buf = [0u8; 64];
        let len = Tagged::new(0, Response::Slot(bytes)).serialize(&mut buf).unwrap();
        wire.extend_from_slice(&buf[..len]);

        let frame = FrameDecoder::decode(FrameKind::Response, &wire).unwrap();
        prop_assert_eq!(Response::from_frame(&frame), Ok(Response::Slot(bytes)));
    }
}

#[test]
fn empty_slot_bytes_decode_to_empty_map() {
    assert!(codec::is_empty(&codec::decode(&[0u8; MAP_LEN])));
}
