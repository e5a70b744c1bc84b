//! Core types and traits for termstore
//!
//! This crate defines the foundational types used throughout the system:
//! - Nid: compact 32-bit component identifier
//! - PublicId: UUID-set identity that survives across stores
//! - StampTime / Stamp: STAMP provenance of a version
//! - StampedVersion: the seam trait the version calculator works through
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod nid;
pub mod public_id;
pub mod stamp;

pub use error::{Error, Result};
pub use nid::Nid;
pub use public_id::PublicId;
pub use stamp::{Stamp, StampTime, StampedVersion};
