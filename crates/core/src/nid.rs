//! Native identifier type
//!
//! A `Nid` is the compact 32-bit handle every component is addressed by
//! inside one store. Non-negative nids are the durable space; negative nids
//! are the ephemeral/reserved space. Both share one storage addressing
//! scheme (see `termstore_storage::remap_key`).
//!
//! `i32::MAX` is never issued: it is the empty-slot sentinel of the
//! spined integer store, so a nid stored as a value can never be mistaken
//! for an empty slot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal 32-bit identifier for any component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nid(i32);

impl Nid {
    /// Highest nid the durable space will ever issue
    pub const MAX_DURABLE: Nid = Nid(i32::MAX - 1);

    /// First nid of the durable space
    pub const FIRST_DURABLE: Nid = Nid(1);

    /// First nid of the ephemeral space (grows downward)
    pub const FIRST_EPHEMERAL: Nid = Nid(-1);

    /// Wrap a raw value
    #[inline]
    pub const fn new(raw: i32) -> Self {
        Nid(raw)
    }

    /// Raw value
    #[inline]
    pub const fn get(self) -> i32 {
        self.0
    }

    /// True for nids in the negative (ephemeral/reserved) space
    #[inline]
    pub const fn is_ephemeral(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Nid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for Nid {
    fn from(raw: i32) -> Self {
        Nid(raw)
    }
}

impl From<Nid> for i32 {
    fn from(nid: Nid) -> Self {
        nid.0
    }
}
