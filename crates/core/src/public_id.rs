//! Durable component identity
//!
//! A `PublicId` is a set of UUIDs. Order of construction is irrelevant:
//! the UUIDs are kept sorted and de-duplicated so that two PublicIds holding
//! the same UUIDs compare, hash and encode identically.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use uuid::Uuid;

/// Set of UUIDs forming a component's store-independent identity
///
/// ## Invariants
///
/// - Never empty once constructed through `from_uuids`/`new_random`
/// - UUIDs are sorted ascending with no duplicates
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicId {
    uuids: SmallVec<[Uuid; 2]>,
}

impl PublicId {
    /// Build from any collection of UUIDs
    ///
    /// Returns an empty PublicId if the input is empty; callers that need a
    /// usable identity should check `is_empty`.
    pub fn from_uuids<I: IntoIterator<Item = Uuid>>(uuids: I) -> Self {
        let mut uuids: SmallVec<[Uuid; 2]> = uuids.into_iter().collect();
        uuids.sort_unstable();
        uuids.dedup();
        Self { uuids }
    }

    /// Single random (v4) UUID identity
    pub fn new_random() -> Self {
        Self::from_uuids([Uuid::new_v4()])
    }

    /// Sorted UUIDs
    pub fn uuids(&self) -> &[Uuid] {
        &self.uuids
    }

    /// Number of UUIDs
    pub fn len(&self) -> usize {
        self.uuids.len()
    }

    /// True if there are no UUIDs
    pub fn is_empty(&self) -> bool {
        self.uuids.is_empty()
    }

    /// Check membership of a single UUID
    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.uuids.binary_search(uuid).is_ok()
    }

    /// True if the two identities share at least one UUID
    pub fn intersects(&self, other: &PublicId) -> bool {
        other.uuids.iter().any(|u| self.contains(u))
    }

    /// Union of two identities (used when aliases are merged onto one nid)
    pub fn union(&self, other: &PublicId) -> PublicId {
        PublicId::from_uuids(self.uuids.iter().chain(other.uuids.iter()).copied())
    }
}

impl fmt::Display for PublicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, uuid) in self.uuids.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", uuid)?;
        }
        write!(f, "]")
    }
}

impl From<Uuid> for PublicId {
    fn from(uuid: Uuid) -> Self {
        PublicId::from_uuids([uuid])
    }
}
