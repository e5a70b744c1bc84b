//! Spined storage for termstore
//!
//! This crate implements the sparse, concurrently-writable maps that back
//! the entity store:
//! - SpinedIntIntMap: `i32 -> i32` over atomic slots
//! - SpinedByteArrayMap: `i32 -> bytes` over RwLock-guarded slots
//! - SlotRange: splittable traversal for sequential and rayon iteration
//!
//! # Persistence
//!
//! Each map persists to a directory: one `spine-<index>` file per
//! materialized spine plus a `SPINE_COUNT` file recording the high-water
//! spine count of both key regions. Only spines mutated since the last
//! flush are rewritten.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod byte_map;
pub mod int_map;
pub mod range;
pub mod spine;
pub mod spine_file;

pub use byte_map::SpinedByteArrayMap;
pub use int_map::{SpinedIntIntMap, SENTINEL};
pub use range::SlotRange;
pub use spine::{remap_key, restore_key, SpineLayout, SpineSlots, DEFAULT_MAX_SPINE_GAP, DEFAULT_SPINE_SIZE};
