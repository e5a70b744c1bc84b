//! Entity model for termstore
//!
//! This crate defines the records the entity store persists:
//! - Chronology: nid, public id and an append-only version list
//! - ConceptEntity, SemanticEntity, PatternEntity: the chronology kinds
//! - StampEntity: a stamp with its identity
//! - Entity: the sum of all four, with framed encodings and a standard
//!   decoder registry
//!
//! Records are plain values. Reading and writing them through a store, and
//! resolving which version applies, live in the engine and coordinate crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chronology;
pub mod entity;
pub mod field;
pub mod version;

pub use chronology::Chronology;
pub use entity::{
    entity_registry, ConceptEntity, Entity, EntityKind, EntityVersion, PatternEntity,
    SemanticEntity, StampEntity,
};
pub use field::{FieldDataType, FieldValue};
pub use version::{ConceptVersion, FieldDefinition, PatternVersion, SemanticVersion, VersionRecord};
