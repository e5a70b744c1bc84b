//! Error types for termstore
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! A contradiction between versions is deliberately absent: the calculator
//! reports it as a `Latest::Contradiction` result that callers must handle.

use crate::{Nid, PublicId};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for termstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the terminology store
#[derive(Debug, Error)]
pub enum Error {
    /// A nid with no registered PublicId, or a PublicId with no nid
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    /// A PublicId whose UUIDs resolve to more than one existing nid
    #[error("Ambiguous identity: {public_id} resolves to nids {nids:?}")]
    AmbiguousIdentity {
        /// The identity that could not be resolved to a single nid
        public_id: PublicId,
        /// Every distinct nid its UUIDs map to
        nids: Vec<Nid>,
    },

    /// A format-version tag outside the supported range
    #[error("Unsupported encoding version for {what}: found {found}, supported [{min}, {max}]")]
    UnsupportedEncodingVersion {
        /// Container format or the type tag being decoded
        what: String,
        /// Version read from the stream
        found: i32,
        /// Lowest supported version
        min: i32,
        /// Highest supported version
        max: i32,
    },

    /// No decoder registered for the type discriminator read from a stream
    #[error("No decoder registered for type: {0}")]
    UnknownTypeForDecode(String),

    /// Length or content mismatch while loading a spine file
    #[error("Corrupt spine file {path}: {reason}")]
    CorruptSpineFile {
        /// File that failed to load
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// A write would create a spine far beyond the populated range
    #[error("Spine {spine_index} for key {key} is more than {max_gap} spines past the high-water mark {high_water}")]
    SpineGap {
        /// Key being written
        key: i32,
        /// Spine that would have been created
        spine_index: u32,
        /// Current high-water spine count of the key's region
        high_water: u32,
        /// Configured gap threshold
        max_gap: u32,
    },

    /// Attempt to store the reserved empty-slot sentinel as a value
    #[error("Value {value} at key {key} collides with the empty-slot sentinel")]
    SentinelValue {
        /// Key being written
        key: i32,
        /// Offending value
        value: i32,
    },

    /// Stream ended before a complete value could be read
    #[error("Unexpected end of input: {0}")]
    UnexpectedEof(String),

    /// Structurally invalid encoded data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Immutable chronology fields disagree during a merge
    #[error("Chronology mismatch for nid {nid}: {reason}")]
    ChronologyMismatch {
        /// Chronology being merged
        nid: Nid,
        /// Which field disagreed
        reason: String,
    },

    /// Attempt to rewrite a stamp that already has a committed time
    #[error("Stamp {0} is already committed")]
    StampCommitted(Nid),

    /// The store directory is held by another process
    #[error("Store at '{0}' is already in use by another process")]
    StoreLocked(PathBuf),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Unknown nid
    pub fn unknown_nid(nid: Nid) -> Self {
        Error::UnknownIdentifier(format!("nid {}", nid))
    }

    /// Unknown PublicId
    pub fn unknown_public_id(public_id: &PublicId) -> Self {
        Error::UnknownIdentifier(format!("public id {}", public_id))
    }

    /// Corrupt spine file with a reason
    pub fn corrupt_spine(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptSpineFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for the identity-resolution kinds
    pub fn is_identity_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownIdentifier(_) | Error::AmbiguousIdentity { .. }
        )
    }

    /// True for the decode kinds a bulk loader may skip past
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedEncodingVersion { .. }
                | Error::UnknownTypeForDecode(_)
                | Error::UnexpectedEof(_)
                | Error::InvalidData(_)
        )
    }
}
