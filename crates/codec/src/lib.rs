//! Binary codec for termstore
//!
//! Every persisted object is framed so that a decoder with no other context
//! can dispatch it:
//!
//! ```text
//! ┌───────────────────┬──────────────────────┬──────────────────┬───────────┐
//! │ Container version │ Type tag             │ Object version   │ Payload   │
//! │ (i32, BE)         │ (i32 len + UTF-8)    │ (i32, BE)        │           │
//! └───────────────────┴──────────────────────┴──────────────────┴───────────┘
//! ```
//!
//! The container version is checked by [`DecoderInput::new`]. The type tag
//! and object version are resolved through a [`DecoderRegistry`], which maps
//! `(tag, version)` to a decode function registered at startup.
//!
//! All integers are big-endian. Strings and byte arrays carry an `i32`
//! length prefix.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decoder;
pub mod encoder;
pub mod registry;

pub use decoder::DecoderInput;
pub use encoder::EncoderOutput;
pub use registry::{DecodeFn, DecoderRegistry};

use termstore_core::{Error, Result};

/// Container version written by this build
pub const CONTAINER_VERSION: i32 = 11;

/// Oldest container version this build can read
pub const MIN_CONTAINER_VERSION: i32 = 10;

/// Newest container version this build can read
pub const MAX_CONTAINER_VERSION: i32 = 11;

/// A type with a stable framed encoding
pub trait Encodable {
    /// Stable type discriminator written into the frame
    const TYPE_TAG: &'static str;

    /// Object format version written by this build
    const ENCODING_VERSION: i32;

    /// Write the payload (no frame)
    fn encode_fields(&self, out: &mut EncoderOutput);

    /// Encode as a complete, self-describing frame
    ///
    /// # Errors
    ///
    /// `Error::InvalidData` if a length exceeds what the format can hold.
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = EncoderOutput::new();
        out.write_frame_header(Self::TYPE_TAG, Self::ENCODING_VERSION);
        self.encode_fields(&mut out);
        out.into_bytes()
    }
}

/// A type that can be read back from its framed encoding
pub trait Decodable: Encodable + Sized {
    /// Oldest object format version still readable
    const MIN_ENCODING_VERSION: i32 = 1;

    /// Read the payload written under object format `version`
    fn decode_fields(input: &mut DecoderInput<'_>, version: i32) -> Result<Self>;

    /// Decode a complete frame that must carry this type's tag
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut input = DecoderInput::new(bytes)?;
        let tag = input.read_string()?;
        if tag != Self::TYPE_TAG {
            return Err(Error::UnknownTypeForDecode(format!(
                "{} (expected {})",
                tag,
                Self::TYPE_TAG
            )));
        }
        let version = input.read_i32()?;
        check_version(Self::TYPE_TAG, version, Self::MIN_ENCODING_VERSION, Self::ENCODING_VERSION)?;
        let value = Self::decode_fields(&mut input, version)?;
        input.expect_end()?;
        Ok(value)
    }
}

/// Reject a version outside `[min, max]`
pub fn check_version(what: &str, found: i32, min: i32, max: i32) -> Result<()> {
    if (min..=max).contains(&found) {
        Ok(())
    } else {
        Err(Error::UnsupportedEncodingVersion {
            what: what.to_string(),
            found,
            min,
            max,
        })
    }
}
