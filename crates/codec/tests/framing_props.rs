//! Property tests for the framing layer
//!
//! Arbitrary input must produce a typed error, never a panic, and every
//! primitive written by the encoder must read back bit-for-bit.

use proptest::prelude::*;
use termstore_codec::{DecoderInput, DecoderRegistry, EncoderOutput, CONTAINER_VERSION};
use termstore_core::{Error, Nid, PublicId};
use uuid::Uuid;

fn string_registry() -> DecoderRegistry<String> {
    let mut registry = DecoderRegistry::new();
    registry.register("test.Text", 1, |input, _| input.read_string());
    registry
}

proptest! {
    #[test]
    fn prop_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let registry = string_registry();
        match registry.decode(&bytes) {
            Ok(_) => {}
            Err(e) => prop_assert!(matches!(
                e,
                Error::UnexpectedEof(_)
                    | Error::InvalidData(_)
                    | Error::UnknownTypeForDecode(_)
                    | Error::UnsupportedEncodingVersion { .. }
            ), "unexpected error variant: {:?}", e),
        }
    }

    #[test]
    fn prop_truncated_frame_is_eof(text in ".{0,40}", cut in 1usize..64) {
        let mut out = EncoderOutput::new();
        out.write_frame_header("test.Text", 1);
        out.write_string(&text);
        let bytes = out.into_bytes().unwrap();
        let cut = cut.min(bytes.len());
        let err = string_registry().decode(&bytes[..bytes.len() - cut]).unwrap_err();
        prop_assert!(matches!(err, Error::UnexpectedEof(_)));
    }

    #[test]
    fn prop_primitives_read_back(
        flag in any::<bool>(),
        int in any::<i32>(),
        long in any::<i64>(),
        float_bits in any::<u32>(),
        text in ".{0,40}",
        bytes in proptest::collection::vec(any::<u8>(), 0..64),
        uuids in proptest::collection::vec(any::<u128>(), 1..4),
    ) {
        let public_id = PublicId::from_uuids(uuids.into_iter().map(Uuid::from_u128));
        let float = f32::from_bits(float_bits);

        let mut out = EncoderOutput::new();
        out.write_i32(CONTAINER_VERSION);
        out.write_bool(flag);
        out.write_i32(int);
        out.write_i64(long);
        out.write_f32(float);
        out.write_string(&text);
        out.write_bytes(&bytes);
        out.write_public_id(&public_id);
        out.write_nid(Nid::new(int));
        let encoded = out.into_bytes().unwrap();

        let mut input = DecoderInput::new(&encoded).unwrap();
        prop_assert_eq!(input.read_bool().unwrap(), flag);
        prop_assert_eq!(input.read_i32().unwrap(), int);
        prop_assert_eq!(input.read_i64().unwrap(), long);
        prop_assert_eq!(input.read_f32().unwrap().to_bits(), float_bits);
        prop_assert_eq!(input.read_string().unwrap(), text);
        prop_assert_eq!(input.read_bytes().unwrap(), bytes);
        prop_assert_eq!(input.read_public_id().unwrap(), public_id);
        prop_assert_eq!(input.read_nid().unwrap(), Nid::new(int));
        prop_assert!(input.expect_end().is_ok());
    }
}
