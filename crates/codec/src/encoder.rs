//! Encoder output buffer

use crate::CONTAINER_VERSION;
use termstore_core::{Error, Nid, PublicId, Result};
use uuid::Uuid;

/// Growable big-endian output buffer
///
/// Writes never fail. A length the format cannot represent is remembered
/// and reported by [`EncoderOutput::into_bytes`].
#[derive(Debug, Default, Clone)]
pub struct EncoderOutput {
    buf: Vec<u8>,
    /// First length above `i32::MAX` passed to `write_len`
    oversize: Option<usize>,
}

impl EncoderOutput {
    /// Empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty buffer with reserved capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            oversize: None,
        }
    }

    /// Write the container version, type tag and object version
    pub fn write_frame_header(&mut self, type_tag: &str, object_version: i32) {
        self.write_i32(CONTAINER_VERSION);
        self.write_string(type_tag);
        self.write_i32(object_version);
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    /// Single byte
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Boolean as one byte (0 or 1)
    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    /// 32-bit signed integer
    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// 64-bit signed integer
    #[inline]
    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// 32-bit float, bit pattern preserved
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_bits().to_be_bytes());
    }

    /// Length prefix for a string, byte array or sequence
    ///
    /// Lengths above `i32::MAX` cannot be represented in the format; the
    /// buffer is poisoned and `into_bytes` fails.
    #[inline]
    pub fn write_len(&mut self, len: usize) {
        match i32::try_from(len) {
            Ok(len) => self.write_i32(len),
            Err(_) => {
                self.oversize.get_or_insert(len);
                self.write_i32(-1);
            }
        }
    }

    /// Length-prefixed UTF-8
    pub fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    /// Length-prefixed raw bytes
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.write_len(value.len());
        self.buf.extend_from_slice(value);
    }

    // ========================================================================
    // Identifiers
    // ========================================================================

    /// UUID as 16 raw bytes
    pub fn write_uuid(&mut self, uuid: &Uuid) {
        self.buf.extend_from_slice(uuid.as_bytes());
    }

    /// UUID count followed by each UUID in sorted order
    pub fn write_public_id(&mut self, public_id: &PublicId) {
        self.write_len(public_id.len());
        for uuid in public_id.uuids() {
            self.write_uuid(uuid);
        }
    }

    /// Component reference
    #[inline]
    pub fn write_nid(&mut self, nid: Nid) {
        self.write_i32(nid.get());
    }

    /// Length-prefixed list of component references
    pub fn write_nids(&mut self, nids: &[Nid]) {
        self.write_len(nids.len());
        for nid in nids {
            self.write_nid(*nid);
        }
    }

    // ========================================================================
    // Output
    // ========================================================================

    /// Bytes written so far
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Number of bytes written
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the encoded bytes
    ///
    /// # Errors
    ///
    /// `Error::InvalidData` if a length above `i32::MAX` was written.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self.oversize {
            Some(len) => Err(Error::InvalidData(format!(
                "length {} exceeds the encodable maximum {}",
                len,
                i32::MAX
            ))),
            None => Ok(self.buf),
        }
    }
}
