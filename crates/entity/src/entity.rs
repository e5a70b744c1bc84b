//! Entity records and their framed encodings
//!
//! Every record persisted in the entity store is one of four kinds. Each
//! kind has its own type tag and object version:
//!
//! ```text
//! Tag                          Payload
//! termstore.ConceptEntity      nid, public id, versions
//! termstore.SemanticEntity     nid, public id, referenced nid, pattern nid, versions
//! termstore.PatternEntity      nid, public id, versions
//! termstore.StampEntity        nid, public id, status, time (i64), author, module, path
//! ```
//!
//! Component references are encoded as nids throughout. Moving records
//! between stores goes through a change set, which remaps them.

use crate::chronology::Chronology;
use crate::version::{ConceptVersion, PatternVersion, SemanticVersion};
use once_cell::sync::Lazy;
use termstore_codec::{Decodable, DecoderInput, DecoderRegistry, Encodable, EncoderOutput};
use termstore_core::{Error, Nid, PublicId, Result, Stamp, StampTime, StampedVersion};

/// Concept chronology
pub type ConceptEntity = Chronology<ConceptVersion>;

/// Pattern chronology
pub type PatternEntity = Chronology<PatternVersion>;

/// Record kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Concept
    Concept,
    /// Semantic
    Semantic,
    /// Pattern
    Pattern,
    /// Stamp
    Stamp,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Concept => "concept",
            EntityKind::Semantic => "semantic",
            EntityKind::Pattern => "pattern",
            EntityKind::Stamp => "stamp",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Semantic
// ============================================================================

/// Semantic chronology: versions plus what it is about and which pattern
/// governs its fields
///
/// `referenced_component_nid` and `pattern_nid` never change over the life
/// of the chronology.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticEntity {
    chronology: Chronology<SemanticVersion>,
    referenced_component_nid: Nid,
    pattern_nid: Nid,
}

impl SemanticEntity {
    /// Build a semantic chronology
    pub fn new(
        nid: Nid,
        public_id: PublicId,
        referenced_component_nid: Nid,
        pattern_nid: Nid,
        versions: Vec<SemanticVersion>,
    ) -> Result<Self> {
        Ok(Self {
            chronology: Chronology::new(nid, public_id, versions)?,
            referenced_component_nid,
            pattern_nid,
        })
    }

    /// Component nid
    pub fn nid(&self) -> Nid {
        self.chronology.nid()
    }

    /// Canonical identity
    pub fn public_id(&self) -> &PublicId {
        self.chronology.public_id()
    }

    /// Component this semantic is about
    pub fn referenced_component_nid(&self) -> Nid {
        self.referenced_component_nid
    }

    /// Pattern governing the field list
    pub fn pattern_nid(&self) -> Nid {
        self.pattern_nid
    }

    /// Versions in append order
    pub fn versions(&self) -> &[SemanticVersion] {
        self.chronology.versions()
    }

    /// Underlying chronology
    pub fn chronology(&self) -> &Chronology<SemanticVersion> {
        &self.chronology
    }

    /// Fold `incoming` into this chronology
    pub fn merge(&mut self, incoming: SemanticEntity) -> Result<usize> {
        if incoming.referenced_component_nid != self.referenced_component_nid {
            return Err(Error::ChronologyMismatch {
                nid: self.nid(),
                reason: format!(
                    "referenced component {} differs from {}",
                    incoming.referenced_component_nid, self.referenced_component_nid
                ),
            });
        }
        if incoming.pattern_nid != self.pattern_nid {
            return Err(Error::ChronologyMismatch {
                nid: self.nid(),
                reason: format!(
                    "pattern {} differs from {}",
                    incoming.pattern_nid, self.pattern_nid
                ),
            });
        }
        self.chronology.merge(incoming.chronology)
    }

    /// Stamps on which `incoming` revises a stored version
    pub fn revised_stamps(&self, incoming: &SemanticEntity) -> Vec<Nid> {
        self.chronology.revised_stamps(&incoming.chronology)
    }

    /// Copy with every nid passed through `remap`
    pub fn remap_nids(&self, remap: &mut impl FnMut(Nid) -> Result<Nid>) -> Result<Self> {
        Ok(Self {
            chronology: self.chronology.remap_nids(remap)?,
            referenced_component_nid: remap(self.referenced_component_nid)?,
            pattern_nid: remap(self.pattern_nid)?,
        })
    }
}

// ============================================================================
// Stamp
// ============================================================================

/// Stored stamp with its identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampEntity {
    /// Stamp nid
    pub nid: Nid,
    /// Canonical identity
    pub public_id: PublicId,
    /// STAMP values
    pub stamp: Stamp,
}

impl StampEntity {
    /// New stamp record
    pub fn new(nid: Nid, public_id: PublicId, stamp: Stamp) -> Self {
        Self {
            nid,
            public_id,
            stamp,
        }
    }

    /// Fold a rewrite of this stamp in
    ///
    /// An identical stamp is accepted. Otherwise the stored stamp must still
    /// be uncommitted: a committed or canceled stamp never changes.
    pub fn merge(&mut self, incoming: StampEntity) -> Result<()> {
        if incoming.nid != self.nid {
            return Err(Error::ChronologyMismatch {
                nid: self.nid,
                reason: format!("cannot merge stamp {}", incoming.nid),
            });
        }
        if incoming.stamp != self.stamp {
            if !self.stamp.time.is_uncommitted() {
                return Err(Error::StampCommitted(self.nid));
            }
            self.stamp = incoming.stamp;
        }
        self.public_id = self.public_id.union(&incoming.public_id);
        Ok(())
    }

    /// Copy with every nid passed through `remap`
    pub fn remap_nids(&self, remap: &mut impl FnMut(Nid) -> Result<Nid>) -> Result<Self> {
        let stamp = self.stamp;
        Ok(Self::new(
            remap(self.nid)?,
            self.public_id.clone(),
            Stamp {
                status: remap(stamp.status)?,
                time: stamp.time,
                author: remap(stamp.author)?,
                module: remap(stamp.module)?,
                path: remap(stamp.path)?,
            },
        ))
    }
}

// ============================================================================
// Entity
// ============================================================================

/// Any record held by the entity store
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// Concept chronology
    Concept(ConceptEntity),
    /// Semantic chronology
    Semantic(SemanticEntity),
    /// Pattern chronology
    Pattern(PatternEntity),
    /// Stamp
    Stamp(StampEntity),
}

/// Borrowed version of any chronology kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityVersion<'a> {
    /// Concept version
    Concept(&'a ConceptVersion),
    /// Semantic version
    Semantic(&'a SemanticVersion),
    /// Pattern version
    Pattern(&'a PatternVersion),
}

impl StampedVersion for EntityVersion<'_> {
    fn stamp_nid(&self) -> Nid {
        match self {
            EntityVersion::Concept(v) => v.stamp_nid,
            EntityVersion::Semantic(v) => v.stamp_nid,
            EntityVersion::Pattern(v) => v.stamp_nid,
        }
    }
}

impl Entity {
    /// Record nid
    pub fn nid(&self) -> Nid {
        match self {
            Entity::Concept(c) => c.nid(),
            Entity::Semantic(s) => s.nid(),
            Entity::Pattern(p) => p.nid(),
            Entity::Stamp(s) => s.nid,
        }
    }

    /// Canonical identity
    pub fn public_id(&self) -> &PublicId {
        match self {
            Entity::Concept(c) => c.public_id(),
            Entity::Semantic(s) => s.public_id(),
            Entity::Pattern(p) => p.public_id(),
            Entity::Stamp(s) => &s.public_id,
        }
    }

    /// Record kind
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Concept(_) => EntityKind::Concept,
            Entity::Semantic(_) => EntityKind::Semantic,
            Entity::Pattern(_) => EntityKind::Pattern,
            Entity::Stamp(_) => EntityKind::Stamp,
        }
    }

    /// Versions in append order; empty for a stamp
    pub fn versions(&self) -> Vec<EntityVersion<'_>> {
        match self {
            Entity::Concept(c) => c.versions().iter().map(EntityVersion::Concept).collect(),
            Entity::Semantic(s) => s.versions().iter().map(EntityVersion::Semantic).collect(),
            Entity::Pattern(p) => p.versions().iter().map(EntityVersion::Pattern).collect(),
            Entity::Stamp(_) => Vec::new(),
        }
    }

    /// Semantic record, if this is one
    pub fn as_semantic(&self) -> Option<&SemanticEntity> {
        match self {
            Entity::Semantic(s) => Some(s),
            _ => None,
        }
    }

    /// Stamp record, if this is one
    pub fn as_stamp(&self) -> Option<&StampEntity> {
        match self {
            Entity::Stamp(s) => Some(s),
            _ => None,
        }
    }

    /// Fold `incoming` into this record
    ///
    /// Chronologies union their versions; stamps follow the stamp rewrite
    /// rule. Returns the number of versions appended.
    pub fn merge(&mut self, incoming: Entity) -> Result<usize> {
        match (self, incoming) {
            (Entity::Concept(current), Entity::Concept(incoming)) => current.merge(incoming),
            (Entity::Semantic(current), Entity::Semantic(incoming)) => current.merge(incoming),
            (Entity::Pattern(current), Entity::Pattern(incoming)) => current.merge(incoming),
            (Entity::Stamp(current), Entity::Stamp(incoming)) => current.merge(incoming).map(|_| 0),
            (current, incoming) => Err(Error::ChronologyMismatch {
                nid: current.nid(),
                reason: format!("stored {} cannot merge a {}", current.kind(), incoming.kind()),
            }),
        }
    }

    /// Stamps on which `incoming` would replace a stored version
    ///
    /// Empty for stamp records, which follow their own rewrite rule, and for
    /// a kind mismatch, which `merge` rejects.
    pub fn revised_stamps(&self, incoming: &Entity) -> Vec<Nid> {
        match (self, incoming) {
            (Entity::Concept(current), Entity::Concept(incoming)) => current.revised_stamps(incoming),
            (Entity::Semantic(current), Entity::Semantic(incoming)) => current.revised_stamps(incoming),
            (Entity::Pattern(current), Entity::Pattern(incoming)) => current.revised_stamps(incoming),
            _ => Vec::new(),
        }
    }

    /// Copy with every nid (own, stamps, references, field values) remapped
    pub fn remap_nids(&self, mut remap: impl FnMut(Nid) -> Result<Nid>) -> Result<Entity> {
        Ok(match self {
            Entity::Concept(c) => Entity::Concept(c.remap_nids(&mut remap)?),
            Entity::Semantic(s) => Entity::Semantic(s.remap_nids(&mut remap)?),
            Entity::Pattern(p) => Entity::Pattern(p.remap_nids(&mut remap)?),
            Entity::Stamp(s) => Entity::Stamp(s.remap_nids(&mut remap)?),
        })
    }

    /// Framed encoding
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Entity::Concept(c) => c.to_bytes(),
            Entity::Semantic(s) => s.to_bytes(),
            Entity::Pattern(p) => p.to_bytes(),
            Entity::Stamp(s) => s.to_bytes(),
        }
    }

    /// Decode any framed record through the standard registry
    pub fn from_bytes(bytes: &[u8]) -> Result<Entity> {
        entity_registry().decode(bytes)
    }
}

impl From<ConceptEntity> for Entity {
    fn from(c: ConceptEntity) -> Self {
        Entity::Concept(c)
    }
}

impl From<SemanticEntity> for Entity {
    fn from(s: SemanticEntity) -> Self {
        Entity::Semantic(s)
    }
}

impl From<PatternEntity> for Entity {
    fn from(p: PatternEntity) -> Self {
        Entity::Pattern(p)
    }
}

impl From<StampEntity> for Entity {
    fn from(s: StampEntity) -> Self {
        Entity::Stamp(s)
    }
}

// ============================================================================
// Encodings
// ============================================================================

impl Encodable for ConceptEntity {
    const TYPE_TAG: &'static str = "termstore.ConceptEntity";
    const ENCODING_VERSION: i32 = 1;

    fn encode_fields(&self, out: &mut EncoderOutput) {
        self.encode_identity(out);
        self.encode_versions(out);
    }
}

impl Decodable for ConceptEntity {
    fn decode_fields(input: &mut DecoderInput<'_>, _version: i32) -> Result<Self> {
        let (nid, public_id) = Self::decode_identity(input)?;
        let versions = Self::decode_versions(input)?;
        Chronology::new(nid, public_id, versions)
    }
}

impl Encodable for PatternEntity {
    const TYPE_TAG: &'static str = "termstore.PatternEntity";
    const ENCODING_VERSION: i32 = 1;

    fn encode_fields(&self, out: &mut EncoderOutput) {
        self.encode_identity(out);
        self.encode_versions(out);
    }
}

impl Decodable for PatternEntity {
    fn decode_fields(input: &mut DecoderInput<'_>, _version: i32) -> Result<Self> {
        let (nid, public_id) = Self::decode_identity(input)?;
        let versions = Self::decode_versions(input)?;
        Chronology::new(nid, public_id, versions)
    }
}

impl Encodable for SemanticEntity {
    const TYPE_TAG: &'static str = "termstore.SemanticEntity";
    const ENCODING_VERSION: i32 = 1;

    fn encode_fields(&self, out: &mut EncoderOutput) {
        self.chronology.encode_identity(out);
        out.write_nid(self.referenced_component_nid);
        out.write_nid(self.pattern_nid);
        self.chronology.encode_versions(out);
    }
}

impl Decodable for SemanticEntity {
    fn decode_fields(input: &mut DecoderInput<'_>, _version: i32) -> Result<Self> {
        let (nid, public_id) = Chronology::<SemanticVersion>::decode_identity(input)?;
        let referenced_component_nid = input.read_nid()?;
        let pattern_nid = input.read_nid()?;
        let versions = Chronology::<SemanticVersion>::decode_versions(input)?;
        SemanticEntity::new(nid, public_id, referenced_component_nid, pattern_nid, versions)
    }
}

impl Encodable for StampEntity {
    const TYPE_TAG: &'static str = "termstore.StampEntity";
    const ENCODING_VERSION: i32 = 1;

    fn encode_fields(&self, out: &mut EncoderOutput) {
        let stamp = &self.stamp;
        out.write_nid(self.nid);
        out.write_public_id(&self.public_id);
        out.write_nid(stamp.status);
        out.write_i64(stamp.time.as_millis());
        out.write_nid(stamp.author);
        out.write_nid(stamp.module);
        out.write_nid(stamp.path);
    }
}

impl Decodable for StampEntity {
    fn decode_fields(input: &mut DecoderInput<'_>, _version: i32) -> Result<Self> {
        let nid = input.read_nid()?;
        let public_id = input.read_public_id()?;
        let stamp = Stamp {
            status: input.read_nid()?,
            time: StampTime::from_millis(input.read_i64()?),
            author: input.read_nid()?,
            module: input.read_nid()?,
            path: input.read_nid()?,
        };
        Ok(StampEntity::new(nid, public_id, stamp))
    }
}

static ENTITY_REGISTRY: Lazy<DecoderRegistry<Entity>> = Lazy::new(|| {
    let mut registry = DecoderRegistry::new();
    registry
        .register_decodable::<ConceptEntity>()
        .register_decodable::<SemanticEntity>()
        .register_decodable::<PatternEntity>()
        .register_decodable::<StampEntity>();
    registry
});

/// Registry decoding every record kind into [`Entity`]
pub fn entity_registry() -> &'static DecoderRegistry<Entity> {
    &ENTITY_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldValue;
    use crate::version::FieldDefinition;
    use uuid::Uuid;

    fn id(n: u128) -> PublicId {
        PublicId::from(Uuid::from_u128(n))
    }

    fn semantic(referenced: i32, pattern: i32, stamp: i32) -> SemanticEntity {
        SemanticEntity::new(
            Nid::new(30),
            id(30),
            Nid::new(referenced),
            Nid::new(pattern),
            vec![SemanticVersion::new(
                Nid::new(stamp),
                vec![FieldValue::from("heart"), FieldValue::from(Nid::new(5))],
            )],
        )
        .unwrap()
    }

    #[test]
    fn test_registry_knows_every_kind() {
        let registry = entity_registry();
        for tag in [
            ConceptEntity::TYPE_TAG,
            SemanticEntity::TYPE_TAG,
            PatternEntity::TYPE_TAG,
            StampEntity::TYPE_TAG,
        ] {
            assert!(registry.is_registered(tag));
        }
    }

    #[test]
    fn test_semantic_round_trip_through_registry() {
        let entity = Entity::from(semantic(1, 2, 3));
        assert_eq!(Entity::from_bytes(&entity.to_bytes().unwrap()).unwrap(), entity);
    }

    #[test]
    fn test_pattern_round_trip() {
        let pattern = PatternEntity::new(
            Nid::new(40),
            id(40),
            vec![PatternVersion {
                stamp_nid: Nid::new(3),
                semantic_purpose_nid: Nid::new(7),
                semantic_meaning_nid: Nid::new(8),
                field_definitions: vec![FieldDefinition {
                    data_type_nid: Nid::new(9),
                    purpose_nid: Nid::new(10),
                    meaning_nid: Nid::new(11),
                }],
            }],
        )
        .unwrap();
        assert_eq!(PatternEntity::from_bytes(&pattern.to_bytes().unwrap()).unwrap(), pattern);
    }

    #[test]
    fn test_stamp_round_trip_preserves_sentinels() {
        for time in [StampTime::UNCOMMITTED, StampTime::CANCELED, StampTime::from_millis(99)] {
            let record = StampEntity::new(
                Nid::new(3),
                id(3),
                Stamp {
                    status: Nid::new(1),
                    time,
                    author: Nid::new(2),
                    module: Nid::new(4),
                    path: Nid::new(5),
                },
            );
            let decoded = Entity::from_bytes(&Entity::from(record.clone()).to_bytes().unwrap()).unwrap();
            assert_eq!(decoded, Entity::Stamp(record));
        }
    }

    #[test]
    fn test_semantic_merge_rejects_changed_pattern() {
        let mut current = semantic(1, 2, 3);
        let err = current.merge(semantic(1, 99, 4)).unwrap_err();
        assert!(matches!(err, Error::ChronologyMismatch { .. }));
    }

    #[test]
    fn test_revised_stamps_reports_changed_fields() {
        let stored = Entity::from(semantic(1, 2, 3));
        assert!(stored.revised_stamps(&Entity::from(semantic(1, 2, 3))).is_empty());

        let rewritten = SemanticEntity::new(
            Nid::new(30),
            id(30),
            Nid::new(1),
            Nid::new(2),
            vec![SemanticVersion::new(Nid::new(3), vec![FieldValue::from("rewritten")])],
        )
        .unwrap();
        assert_eq!(stored.revised_stamps(&Entity::from(rewritten)), vec![Nid::new(3)]);
    }

    #[test]
    fn test_merge_rejects_kind_change() {
        let mut current = Entity::from(semantic(1, 2, 3));
        let concept = ConceptEntity::new(Nid::new(30), id(30), vec![ConceptVersion::new(Nid::new(3))])
            .unwrap();
        assert!(current.merge(Entity::from(concept)).is_err());
    }

    #[test]
    fn test_stamp_merge_rules() {
        let stamp = Stamp::uncommitted(Nid::new(1), Nid::new(2), Nid::new(4), Nid::new(5));
        let mut record = StampEntity::new(Nid::new(3), id(3), stamp);

        // uncommitted stamps may be rewritten
        let revised = stamp.with_time(StampTime::from_millis(50));
        record.merge(StampEntity::new(Nid::new(3), id(3), revised)).unwrap();
        assert_eq!(record.stamp.time, StampTime::from_millis(50));

        // identical rewrite of a committed stamp is accepted
        record.merge(StampEntity::new(Nid::new(3), id(3), revised)).unwrap();

        let err = record
            .merge(StampEntity::new(Nid::new(3), id(3), revised.with_time(StampTime::from_millis(60))))
            .unwrap_err();
        assert!(matches!(err, Error::StampCommitted(_)));
    }

    #[test]
    fn test_remap_rewrites_every_reference() {
        let entity = Entity::from(semantic(1, 2, 3));
        let remapped = entity.remap_nids(|nid| Ok(Nid::new(nid.get() * 10))).unwrap();
        let semantic = remapped.as_semantic().unwrap();
        assert_eq!(semantic.nid(), Nid::new(300));
        assert_eq!(semantic.referenced_component_nid(), Nid::new(10));
        assert_eq!(semantic.pattern_nid(), Nid::new(20));
        assert_eq!(semantic.versions()[0].stamp_nid, Nid::new(30));
        assert_eq!(semantic.versions()[0].fields[1], FieldValue::Component(Nid::new(50)));
    }

    #[test]
    fn test_versions_view() {
        let entity = Entity::from(semantic(1, 2, 3));
        let versions = entity.versions();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].stamp_nid(), Nid::new(3));
    }
}
