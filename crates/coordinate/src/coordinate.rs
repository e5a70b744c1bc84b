//! STAMP coordinates
//!
//! A coordinate is a viewpoint: a position (time cutoff on a path) plus the
//! statuses, modules and authors a version must match to be visible.
//!
//! Empty status, module or author sets place no restriction on that axis.
//! A non-empty module list restricts *and* ranks: earlier modules win time
//! ties.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use termstore_core::{Nid, Stamp, StampTime};

/// A time on a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StampPosition {
    /// Time cutoff (inclusive); `StampTime::LATEST` admits everything
    pub time: StampTime,
    /// Path the position is on
    pub path_nid: Nid,
}

impl StampPosition {
    /// Latest position on a path
    pub fn latest(path_nid: Nid) -> Self {
        Self {
            time: StampTime::LATEST,
            path_nid,
        }
    }

    /// Position at a specific time
    pub fn at(time: StampTime, path_nid: Nid) -> Self {
        Self { time, path_nid }
    }
}

impl fmt::Display for StampPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on path {}", self.time, self.path_nid)
    }
}

/// Point at which a path branched from an origin path
///
/// Versions on `path_nid` are visible up to and including `origin_time`.
/// Ordered by origin time, then path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StampBranch {
    /// Origin path
    pub path_nid: Nid,
    /// Last visible time on the origin path
    pub origin_time: StampTime,
}

impl StampBranch {
    /// New branch point
    pub fn new(path_nid: Nid, origin_time: StampTime) -> Self {
        Self {
            path_nid,
            origin_time,
        }
    }

    /// Human-readable form, e.g. `2021-03-01T00:00:00+00:00 on path 12`
    pub fn to_user_string(&self) -> String {
        format!("{} on path {}", self.origin_time, self.path_nid)
    }
}

impl PartialOrd for StampBranch {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StampBranch {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.origin_time
            .cmp(&other.origin_time)
            .then_with(|| self.path_nid.cmp(&other.path_nid))
    }
}

impl fmt::Display for StampBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_user_string())
    }
}

/// Viewpoint used to select versions
///
/// Hashable so it can key a cache of calculation results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StampCoordinate {
    /// Path and time cutoff
    pub position: StampPosition,
    /// Allowed statuses; empty allows any
    pub allowed_statuses: BTreeSet<Nid>,
    /// Allowed modules, most preferred first; empty allows any
    pub module_priority: Vec<Nid>,
    /// Allowed authors; empty allows any
    pub authors: BTreeSet<Nid>,
    /// Origin paths visible through branch points, sorted
    pub path_origins: Vec<StampBranch>,
}

impl StampCoordinate {
    /// Unrestricted coordinate at the latest position of `path_nid`
    pub fn latest_on(path_nid: Nid) -> Self {
        Self::at(StampPosition::latest(path_nid))
    }

    /// Unrestricted coordinate at a position
    pub fn at(position: StampPosition) -> Self {
        Self {
            position,
            allowed_statuses: BTreeSet::new(),
            module_priority: Vec::new(),
            authors: BTreeSet::new(),
            path_origins: Vec::new(),
        }
    }

    /// Same coordinate with a different time cutoff
    pub fn with_time(mut self, time: StampTime) -> Self {
        self.position.time = time;
        self
    }

    /// Restrict statuses
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = Nid>) -> Self {
        self.allowed_statuses = statuses.into_iter().collect();
        self
    }

    /// Restrict and rank modules (earlier preferred); duplicates keep their
    /// first position
    pub fn with_module_priority(mut self, modules: impl IntoIterator<Item = Nid>) -> Self {
        self.module_priority.clear();
        for module in modules {
            if !self.module_priority.contains(&module) {
                self.module_priority.push(module);
            }
        }
        self
    }

    /// Restrict authors
    pub fn with_authors(mut self, authors: impl IntoIterator<Item = Nid>) -> Self {
        self.authors = authors.into_iter().collect();
        self
    }

    /// Add a branch point; origins stay sorted and unique per path
    pub fn with_origin(mut self, origin: StampBranch) -> Self {
        self.path_origins.retain(|o| o.path_nid != origin.path_nid);
        self.path_origins.push(origin);
        self.path_origins.sort();
        self
    }

    /// Rank of a module, lower is better; `None` if not allowed
    pub fn module_rank(&self, module: Nid) -> Option<usize> {
        if self.module_priority.is_empty() {
            Some(0)
        } else {
            self.module_priority.iter().position(|m| *m == module)
        }
    }

    /// Latest visible time on `path_nid`, `None` if the path is not visible
    pub fn cutoff_for_path(&self, path_nid: Nid) -> Option<StampTime> {
        if path_nid == self.position.path_nid {
            return Some(self.position.time);
        }
        self.path_origins
            .iter()
            .find(|origin| origin.path_nid == path_nid)
            .map(|origin| origin.origin_time.min(self.position.time))
    }

    /// True if a version under `stamp` is visible from this coordinate
    pub fn admits(&self, stamp: &Stamp) -> bool {
        if stamp.time.is_canceled() {
            return false;
        }
        if !self.allowed_statuses.is_empty() && !self.allowed_statuses.contains(&stamp.status) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.contains(&stamp.author) {
            return false;
        }
        if self.module_rank(stamp.module).is_none() {
            return false;
        }
        match self.cutoff_for_path(stamp.path) {
            Some(cutoff) => stamp.time <= cutoff,
            None => false,
        }
    }
}

impl fmt::Display for StampCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.position)?;
        if !self.allowed_statuses.is_empty() {
            write!(f, ", statuses {:?}", self.allowed_statuses)?;
        }
        if !self.module_priority.is_empty() {
            write!(f, ", modules {:?}", self.module_priority)?;
        }
        if !self.authors.is_empty() {
            write!(f, ", authors {:?}", self.authors)?;
        }
        for origin in &self.path_origins {
            write!(f, ", from {}", origin)?;
        }
        Ok(())
    }
}
