//! Semantic field values
//!
//! Each value is written as a one-byte type token followed by the value, so
//! a field list decodes without consulting the governing pattern.
//!
//! ```text
//! Token  Type        Value
//! 0x00   String      i32 len + UTF-8
//! 0x01   Integer     i32
//! 0x02   Float       f32 bits
//! 0x03   Boolean     u8 (0 or 1)
//! 0x04   Bytes       i32 len + raw bytes
//! 0x05   Component   nid (i32)
//! ```

use termstore_codec::{DecoderInput, EncoderOutput};
use termstore_core::{Error, Nid, Result};

/// Field type tokens
const TOKEN_STRING: u8 = 0x00;
const TOKEN_INTEGER: u8 = 0x01;
const TOKEN_FLOAT: u8 = 0x02;
const TOKEN_BOOLEAN: u8 = 0x03;
const TOKEN_BYTES: u8 = 0x04;
const TOKEN_COMPONENT: u8 = 0x05;

/// Runtime type of a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldDataType {
    /// UTF-8 text
    String,
    /// 32-bit signed integer
    Integer,
    /// 32-bit float
    Float,
    /// Boolean
    Boolean,
    /// Opaque bytes
    Bytes,
    /// Reference to another component
    Component,
}

impl FieldDataType {
    /// Wire token
    pub const fn token(self) -> u8 {
        match self {
            FieldDataType::String => TOKEN_STRING,
            FieldDataType::Integer => TOKEN_INTEGER,
            FieldDataType::Float => TOKEN_FLOAT,
            FieldDataType::Boolean => TOKEN_BOOLEAN,
            FieldDataType::Bytes => TOKEN_BYTES,
            FieldDataType::Component => TOKEN_COMPONENT,
        }
    }

    /// Type for a wire token
    pub fn from_token(token: u8) -> Result<Self> {
        match token {
            TOKEN_STRING => Ok(FieldDataType::String),
            TOKEN_INTEGER => Ok(FieldDataType::Integer),
            TOKEN_FLOAT => Ok(FieldDataType::Float),
            TOKEN_BOOLEAN => Ok(FieldDataType::Boolean),
            TOKEN_BYTES => Ok(FieldDataType::Bytes),
            TOKEN_COMPONENT => Ok(FieldDataType::Component),
            other => Err(Error::InvalidData(format!("unknown field token 0x{:02x}", other))),
        }
    }
}

/// One value in a semantic version's field list
///
/// Floats compare by bit pattern, so every value equals its own decoding,
/// NaN included.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// UTF-8 text
    String(String),
    /// 32-bit signed integer
    Integer(i32),
    /// 32-bit float
    Float(f32),
    /// Boolean
    Boolean(bool),
    /// Opaque bytes
    Bytes(Vec<u8>),
    /// Reference to another component by nid
    Component(Nid),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::String(a), FieldValue::String(b)) => a == b,
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a == b,
            (FieldValue::Float(a), FieldValue::Float(b)) => a.to_bits() == b.to_bits(),
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => a == b,
            (FieldValue::Bytes(a), FieldValue::Bytes(b)) => a == b,
            (FieldValue::Component(a), FieldValue::Component(b)) => a == b,
            _ => false,
        }
    }
}

impl FieldValue {
    /// Runtime type of this value
    pub fn data_type(&self) -> FieldDataType {
        match self {
            FieldValue::String(_) => FieldDataType::String,
            FieldValue::Integer(_) => FieldDataType::Integer,
            FieldValue::Float(_) => FieldDataType::Float,
            FieldValue::Boolean(_) => FieldDataType::Boolean,
            FieldValue::Bytes(_) => FieldDataType::Bytes,
            FieldValue::Component(_) => FieldDataType::Component,
        }
    }

    /// Referenced nid, if this is a component reference
    pub fn as_component(&self) -> Option<Nid> {
        match self {
            FieldValue::Component(nid) => Some(*nid),
            _ => None,
        }
    }

    /// Text, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Token then value
    pub fn encode(&self, out: &mut EncoderOutput) {
        out.write_u8(self.data_type().token());
        match self {
            FieldValue::String(s) => out.write_string(s),
            FieldValue::Integer(i) => out.write_i32(*i),
            FieldValue::Float(f) => out.write_f32(*f),
            FieldValue::Boolean(b) => out.write_bool(*b),
            FieldValue::Bytes(bytes) => out.write_bytes(bytes),
            FieldValue::Component(nid) => out.write_nid(*nid),
        }
    }

    /// Read one token-prefixed value
    pub fn decode(input: &mut DecoderInput<'_>) -> Result<Self> {
        let value = match FieldDataType::from_token(input.read_u8()?)? {
            FieldDataType::String => FieldValue::String(input.read_string()?),
            FieldDataType::Integer => FieldValue::Integer(input.read_i32()?),
            FieldDataType::Float => FieldValue::Float(input.read_f32()?),
            FieldDataType::Boolean => FieldValue::Boolean(input.read_bool()?),
            FieldDataType::Bytes => FieldValue::Bytes(input.read_bytes()?),
            FieldDataType::Component => FieldValue::Component(input.read_nid()?),
        };
        Ok(value)
    }

    /// Copy with any component reference passed through `remap`
    pub fn remap_nids(&self, remap: &mut impl FnMut(Nid) -> Result<Nid>) -> Result<Self> {
        Ok(match self {
            FieldValue::Component(nid) => FieldValue::Component(remap(*nid)?),
            other => other.clone(),
        })
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<f32> for FieldValue {
    fn from(f: f32) -> Self {
        FieldValue::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<Nid> for FieldValue {
    fn from(nid: Nid) -> Self {
        FieldValue::Component(nid)
    }
}
