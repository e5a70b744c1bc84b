//! STAMP provenance types
//!
//! Every version of every component is tied to one stamp: Status, Time,
//! Author, Module, Path. Time is an epoch millisecond with two sentinels:
//!
//! - `StampTime::UNCOMMITTED` (`i64::MAX`): the change is not yet committed.
//!   Also the `LATEST` cutoff, so uncommitted work is visible only to a
//!   coordinate looking at the latest position.
//! - `StampTime::CANCELED` (`i64::MIN`): the change was abandoned and is
//!   never eligible for version selection.

use crate::Nid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Millisecond-precision stamp time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StampTime(i64);

impl StampTime {
    /// Not yet committed
    pub const UNCOMMITTED: StampTime = StampTime(i64::MAX);

    /// Cutoff that admits every committed and uncommitted version
    pub const LATEST: StampTime = StampTime(i64::MAX);

    /// Abandoned change
    pub const CANCELED: StampTime = StampTime(i64::MIN);

    /// Unix epoch
    pub const EPOCH: StampTime = StampTime(0);

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Current wall-clock time
    pub fn now() -> Self {
        StampTime(Utc::now().timestamp_millis())
    }

    /// From epoch milliseconds
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        StampTime(millis)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Epoch milliseconds (sentinels included)
    #[inline]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// True for the uncommitted sentinel
    #[inline]
    pub const fn is_uncommitted(self) -> bool {
        self.0 == i64::MAX
    }

    /// True for the canceled sentinel
    #[inline]
    pub const fn is_canceled(self) -> bool {
        self.0 == i64::MIN
    }

    /// True for a real commit time
    #[inline]
    pub const fn is_committed(self) -> bool {
        !self.is_uncommitted() && !self.is_canceled()
    }

    /// Wall-clock instant, `None` for sentinels or out-of-range values
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        if self.is_committed() {
            DateTime::<Utc>::from_timestamp_millis(self.0)
        } else {
            None
        }
    }
}

impl fmt::Display for StampTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_uncommitted() {
            write!(f, "latest")
        } else if self.is_canceled() {
            write!(f, "CANCELED")
        } else {
            match self.to_datetime() {
                Some(instant) => write!(f, "{}", instant.to_rfc3339()),
                None => write!(f, "{}ms", self.0),
            }
        }
    }
}

impl From<i64> for StampTime {
    fn from(millis: i64) -> Self {
        StampTime(millis)
    }
}

/// Provenance of one version
///
/// Status, author, module and path are concept references. A stamp is
/// immutable once its time is committed; until then it may be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stamp {
    /// Status concept (active, inactive, ...)
    pub status: Nid,
    /// Commit time or sentinel
    pub time: StampTime,
    /// Author concept
    pub author: Nid,
    /// Module concept
    pub module: Nid,
    /// Path concept
    pub path: Nid,
}

impl Stamp {
    /// New uncommitted stamp
    pub fn uncommitted(status: Nid, author: Nid, module: Nid, path: Nid) -> Self {
        Stamp {
            status,
            time: StampTime::UNCOMMITTED,
            author,
            module,
            path,
        }
    }

    /// Copy with a different time
    pub fn with_time(self, time: StampTime) -> Self {
        Stamp { time, ..self }
    }
}

/// A version that is tied to exactly one stamp
///
/// This is the seam between the entity model and the version calculator:
/// the calculator only needs each version's stamp nid.
pub trait StampedVersion {
    /// Nid of the stamp this version was written under
    fn stamp_nid(&self) -> Nid;
}

impl<V: StampedVersion + ?Sized> StampedVersion for &V {
    fn stamp_nid(&self) -> Nid {
        (**self).stamp_nid()
    }
}
