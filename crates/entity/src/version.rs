//! Version records
//!
//! A version is an immutable snapshot of an entity tied to one stamp. The
//! stamp nid always comes first in the encoding.

use crate::field::FieldValue;
use termstore_codec::{DecoderInput, EncoderOutput};
use termstore_core::{Error, Nid, Result, StampedVersion};

/// Encoding shared by every version type
pub trait VersionRecord: StampedVersion + Clone + PartialEq + Sized {
    /// Write this version
    fn encode(&self, out: &mut EncoderOutput);

    /// Read one version
    fn decode(input: &mut DecoderInput<'_>) -> Result<Self>;

    /// Copy with every nid passed through `remap`
    fn remap_nids(&self, remap: &mut impl FnMut(Nid) -> Result<Nid>) -> Result<Self>;
}

// ============================================================================
// Concept
// ============================================================================

/// Concept version: carries nothing beyond its stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConceptVersion {
    /// Stamp of this version
    pub stamp_nid: Nid,
}

impl ConceptVersion {
    /// New version under `stamp_nid`
    pub fn new(stamp_nid: Nid) -> Self {
        Self { stamp_nid }
    }
}

impl StampedVersion for ConceptVersion {
    fn stamp_nid(&self) -> Nid {
        self.stamp_nid
    }
}

impl VersionRecord for ConceptVersion {
    fn encode(&self, out: &mut EncoderOutput) {
        out.write_nid(self.stamp_nid);
    }

    fn decode(input: &mut DecoderInput<'_>) -> Result<Self> {
        Ok(Self::new(input.read_nid()?))
    }

    fn remap_nids(&self, remap: &mut impl FnMut(Nid) -> Result<Nid>) -> Result<Self> {
        Ok(Self::new(remap(self.stamp_nid)?))
    }
}

// ============================================================================
// Semantic
// ============================================================================

/// Semantic version: an ordered, self-describing field list
///
/// What each position means is defined by the pattern the semantic belongs
/// to.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticVersion {
    /// Stamp of this version
    pub stamp_nid: Nid,
    /// Field values in pattern order
    pub fields: Vec<FieldValue>,
}

impl SemanticVersion {
    /// New version under `stamp_nid`
    pub fn new(stamp_nid: Nid, fields: Vec<FieldValue>) -> Self {
        Self { stamp_nid, fields }
    }
}

impl StampedVersion for SemanticVersion {
    fn stamp_nid(&self) -> Nid {
        self.stamp_nid
    }
}

impl VersionRecord for SemanticVersion {
    fn encode(&self, out: &mut EncoderOutput) {
        out.write_nid(self.stamp_nid);
        out.write_len(self.fields.len());
        for field in &self.fields {
            field.encode(out);
        }
    }

    fn decode(input: &mut DecoderInput<'_>) -> Result<Self> {
        let stamp_nid = input.read_nid()?;
        let count = input.read_len()?;
        // every field takes at least its token byte
        if count > input.remaining() {
            return Err(Error::UnexpectedEof(format!("{} fields", count)));
        }
        let fields = (0..count)
            .map(|_| FieldValue::decode(input))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { stamp_nid, fields })
    }

    fn remap_nids(&self, remap: &mut impl FnMut(Nid) -> Result<Nid>) -> Result<Self> {
        let stamp_nid = remap(self.stamp_nid)?;
        let fields = self
            .fields
            .iter()
            .map(|field| field.remap_nids(remap))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { stamp_nid, fields })
    }
}

// ============================================================================
// Pattern
// ============================================================================

/// Definition of one field position in a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldDefinition {
    /// Concept naming the value's data type
    pub data_type_nid: Nid,
    /// Concept naming what the value is used for
    pub purpose_nid: Nid,
    /// Concept naming what the value is
    pub meaning_nid: Nid,
}

impl FieldDefinition {
    fn encode(&self, out: &mut EncoderOutput) {
        out.write_nid(self.data_type_nid);
        out.write_nid(self.purpose_nid);
        out.write_nid(self.meaning_nid);
    }

    fn decode(input: &mut DecoderInput<'_>) -> Result<Self> {
        Ok(Self {
            data_type_nid: input.read_nid()?,
            purpose_nid: input.read_nid()?,
            meaning_nid: input.read_nid()?,
        })
    }

    fn remap_nids(&self, remap: &mut impl FnMut(Nid) -> Result<Nid>) -> Result<Self> {
        Ok(Self {
            data_type_nid: remap(self.data_type_nid)?,
            purpose_nid: remap(self.purpose_nid)?,
            meaning_nid: remap(self.meaning_nid)?,
        })
    }
}

/// Pattern version: the schema governing a family of semantics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternVersion {
    /// Stamp of this version
    pub stamp_nid: Nid,
    /// What semantics of this pattern are for
    pub semantic_purpose_nid: Nid,
    /// What semantics of this pattern are
    pub semantic_meaning_nid: Nid,
    /// One definition per field position
    pub field_definitions: Vec<FieldDefinition>,
}

impl StampedVersion for PatternVersion {
    fn stamp_nid(&self) -> Nid {
        self.stamp_nid
    }
}

impl VersionRecord for PatternVersion {
    fn encode(&self, out: &mut EncoderOutput) {
        out.write_nid(self.stamp_nid);
        out.write_nid(self.semantic_purpose_nid);
        out.write_nid(self.semantic_meaning_nid);
        out.write_len(self.field_definitions.len());
        for definition in &self.field_definitions {
            definition.encode(out);
        }
    }

    fn decode(input: &mut DecoderInput<'_>) -> Result<Self> {
        let stamp_nid = input.read_nid()?;
        let semantic_purpose_nid = input.read_nid()?;
        let semantic_meaning_nid = input.read_nid()?;
        let count = input.read_len()?;
        if count > input.remaining() / 12 {
            return Err(Error::UnexpectedEof(format!("{} field definitions", count)));
        }
        let field_definitions = (0..count)
            .map(|_| FieldDefinition::decode(input))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            stamp_nid,
            semantic_purpose_nid,
            semantic_meaning_nid,
            field_definitions,
        })
    }

    fn remap_nids(&self, remap: &mut impl FnMut(Nid) -> Result<Nid>) -> Result<Self> {
        Ok(Self {
            stamp_nid: remap(self.stamp_nid)?,
            semantic_purpose_nid: remap(self.semantic_purpose_nid)?,
            semantic_meaning_nid: remap(self.semantic_meaning_nid)?,
            field_definitions: self
                .field_definitions
                .iter()
                .map(|definition| definition.remap_nids(remap))
                .collect::<Result<Vec<_>>>()?,
        })
    }
}
