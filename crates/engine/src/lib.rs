//! Entity store engine for termstore
//!
//! This crate ties the lower layers together:
//! - IdentifierAllocator: PublicId <-> nid table, persisted per store
//! - EntityStore: open/close, entity merge, stamp lifecycle, indexes
//! - LatestCache: latest-version results per (nid, coordinate)
//! - Change sets: portable export and bulk import between stores
//! - StoreConfig: `termstore.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod cache;
pub mod changeset;
pub mod config;
mod format;
mod index;
pub mod store;

pub use allocator::{IdentifierAllocator, NidSpace, IDENTIFIERS_FILE};
pub use cache::LatestCache;
pub use changeset::{export_store, BulkLoader, ChangeSetReader, ChangeSetWriter, LoadReport};
pub use config::{StoreConfig, CONFIG_FILE_NAME};
pub use store::{EntityStore, LatestVersions};

pub(crate) type FxBuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;
