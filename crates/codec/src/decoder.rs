//! Decoder input cursor
//!
//! Every read is bounds-checked; running out of input is
//! `Error::UnexpectedEof`, malformed content is `Error::InvalidData`.

use crate::{check_version, MAX_CONTAINER_VERSION, MIN_CONTAINER_VERSION};
use termstore_core::{Error, Nid, PublicId, Result};
use uuid::Uuid;

/// Cursor over one framed encoding
#[derive(Debug, Clone)]
pub struct DecoderInput<'a> {
    data: &'a [u8],
    pos: usize,
    container_version: i32,
}

impl<'a> DecoderInput<'a> {
    /// Read and validate the container version at the start of `data`
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut input = Self {
            data,
            pos: 0,
            container_version: 0,
        };
        let version = input.read_i32()?;
        check_version("container", version, MIN_CONTAINER_VERSION, MAX_CONTAINER_VERSION)?;
        input.container_version = version;
        Ok(input)
    }

    /// Container version read from the frame
    pub fn container_version(&self) -> i32 {
        self.container_version
    }

    /// Offset of the next byte
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Fail unless every byte has been consumed
    pub fn expect_end(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(Error::InvalidData(format!(
                "{} trailing bytes after offset {}",
                n, self.pos
            ))),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::UnexpectedEof(format!(
                "need {} bytes at offset {}, {} remaining",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    /// Single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Boolean, only 0 and 1 are accepted
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::InvalidData(format!("invalid boolean byte {}", other))),
        }
    }

    /// 32-bit signed integer
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    /// 64-bit signed integer
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    /// 32-bit float
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(u32::from_be_bytes(self.take_array()?)))
    }

    /// Length prefix; negative lengths and lengths past the end are rejected
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| Error::InvalidData(format!("negative length {}", len)))
    }

    /// Length-prefixed raw bytes
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len()?;
        Ok(self.take(len)?.to_vec())
    }

    /// Length-prefixed UTF-8
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| Error::InvalidData(format!("invalid UTF-8 string: {}", e)))
    }

    // ========================================================================
    // Identifiers
    // ========================================================================

    /// UUID from 16 raw bytes
    pub fn read_uuid(&mut self) -> Result<Uuid> {
        Ok(Uuid::from_bytes(self.take_array()?))
    }

    /// Non-empty UUID set
    pub fn read_public_id(&mut self) -> Result<PublicId> {
        let count = self.read_len()?;
        if count == 0 {
            return Err(Error::InvalidData("public id with no uuids".to_string()));
        }
        // 16 bytes per uuid; checked up front so a bad count fails fast
        if count > self.remaining() / 16 {
            return Err(Error::UnexpectedEof(format!(
                "public id of {} uuids at offset {}",
                count, self.pos
            )));
        }
        let mut uuids = Vec::with_capacity(count);
        for _ in 0..count {
            uuids.push(self.read_uuid()?);
        }
        Ok(PublicId::from_uuids(uuids))
    }

    /// Component reference
    pub fn read_nid(&mut self) -> Result<Nid> {
        Ok(Nid::new(self.read_i32()?))
    }

    /// Length-prefixed list of component references
    pub fn read_nids(&mut self) -> Result<Vec<Nid>> {
        let count = self.read_len()?;
        if count > self.remaining() / 4 {
            return Err(Error::UnexpectedEof(format!(
                "{} nids at offset {}",
                count, self.pos
            )));
        }
        (0..count).map(|_| self.read_nid()).collect()
    }
}
