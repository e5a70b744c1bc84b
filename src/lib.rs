//! termstore - embedded versioned terminology store
//!
//! termstore keeps concepts, semantics and patterns as chronologies: an
//! identity plus an append-only list of versions, each tagged with a STAMP
//! (status, time, author, module, path). Which version applies is decided
//! at read time by a [`StampCoordinate`].
//!
//! # Quick Start
//!
//! ```ignore
//! use termstore::{ConceptEntity, ConceptVersion, EntityStore, PublicId, StampCoordinate};
//!
//! let store = EntityStore::ephemeral()?;
//! let path = store.nid_for_public_id(&PublicId::new_random())?;
//!
//! let stamp = store.new_stamp(active, author, module, path)?;
//! store.commit_stamp(stamp)?;
//!
//! let public_id = PublicId::new_random();
//! let nid = store.nid_for_public_id(&public_id)?;
//! store.put_entity(ConceptEntity::new(nid, public_id, vec![ConceptVersion::new(stamp)])?.into())?;
//!
//! let latest = store.latest(nid, &StampCoordinate::latest_on(path))?;
//! ```
//!
//! # Architecture
//!
//! - `termstore-core`: Nid, PublicId, Stamp, Error
//! - `termstore-storage`: spined sparse maps and their spine files
//! - `termstore-codec`: framed binary encoding and the decoder registry
//! - `termstore-entity`: chronologies and the Entity sum type
//! - `termstore-coordinate`: STAMP coordinates and the version calculator
//! - `termstore-engine`: EntityStore, identifiers, caches, change sets

pub use termstore_codec::{DecoderInput, DecoderRegistry, EncoderOutput};
pub use termstore_coordinate::{
    Latest, StampBranch, StampCalculator, StampCoordinate, StampPosition, StampSource,
};
pub use termstore_core::{Error, Nid, PublicId, Result, Stamp, StampTime, StampedVersion};
pub use termstore_engine::{
    export_store, BulkLoader, ChangeSetReader, ChangeSetWriter, EntityStore, IdentifierAllocator,
    LatestCache, LatestVersions, LoadReport, NidSpace, StoreConfig,
};
pub use termstore_entity::{
    entity_registry, Chronology, ConceptEntity, ConceptVersion, Entity, EntityKind, EntityVersion,
    FieldDataType, FieldDefinition, FieldValue, PatternEntity, PatternVersion, SemanticEntity,
    SemanticVersion, StampEntity,
};
pub use termstore_storage::{SpineLayout, SpinedByteArrayMap, SpinedIntIntMap};
