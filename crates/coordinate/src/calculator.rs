//! Latest-version calculation
//!
//! Given a chronology's versions and a coordinate, select the version(s) that
//! apply:
//!
//! 1. Drop versions whose stamp the coordinate does not admit.
//! 2. Keep the versions with the greatest stamp time.
//! 3. Among those, keep the versions whose module ranks best.
//! 4. One survivor is the answer; several are a contradiction.
//!
//! The calculator never mutates or caches inside the chronology. It only
//! needs a way to resolve stamp nids, supplied as a [`StampSource`].

use crate::{Latest, StampCoordinate};
use std::collections::HashMap;
use std::hash::BuildHasher;
use termstore_core::{Error, Nid, Result, Stamp, StampTime, StampedVersion};
use termstore_entity::{Entity, EntityVersion};

/// Resolves stamp nids to stamps
pub trait StampSource {
    /// Stamp for `stamp_nid`, `None` if unknown
    fn stamp(&self, stamp_nid: Nid) -> Option<Stamp>;
}

impl<S: BuildHasher> StampSource for HashMap<Nid, Stamp, S> {
    fn stamp(&self, stamp_nid: Nid) -> Option<Stamp> {
        self.get(&stamp_nid).copied()
    }
}

impl<T: StampSource + ?Sized> StampSource for &T {
    fn stamp(&self, stamp_nid: Nid) -> Option<Stamp> {
        (**self).stamp(stamp_nid)
    }
}

/// Applies one coordinate to any number of chronologies
#[derive(Debug, Clone)]
pub struct StampCalculator<S> {
    coordinate: StampCoordinate,
    stamps: S,
}

impl<S: StampSource> StampCalculator<S> {
    /// Calculator for `coordinate`, resolving stamps through `stamps`
    pub fn new(coordinate: StampCoordinate, stamps: S) -> Self {
        Self { coordinate, stamps }
    }

    /// Coordinate in use
    pub fn coordinate(&self) -> &StampCoordinate {
        &self.coordinate
    }

    /// True if a version under `stamp` can be selected
    pub fn is_eligible(&self, stamp: &Stamp) -> bool {
        self.coordinate.admits(stamp)
    }

    /// Positions of the selected versions within `versions`
    ///
    /// # Errors
    ///
    /// `Error::UnknownIdentifier` if a version's stamp cannot be resolved.
    pub fn latest_index<V: StampedVersion>(&self, versions: &[V]) -> Result<Latest<usize>> {
        let mut best: Option<(StampTime, usize)> = None;
        let mut tied: Vec<usize> = Vec::new();

        for (index, version) in versions.iter().enumerate() {
            let stamp_nid = version.stamp_nid();
            let stamp = self
                .stamps
                .stamp(stamp_nid)
                .ok_or_else(|| Error::unknown_nid(stamp_nid))?;
            if !self.is_eligible(&stamp) {
                continue;
            }
            // admitted stamps always have a rank
            let rank = match self.coordinate.module_rank(stamp.module) {
                Some(rank) => rank,
                None => continue,
            };
            let key = (stamp.time, rank);

            match best {
                None => {
                    best = Some(key);
                    tied.push(index);
                }
                Some((time, best_rank)) => {
                    if stamp.time > time || (stamp.time == time && rank < best_rank) {
                        best = Some(key);
                        tied.clear();
                        tied.push(index);
                    } else if stamp.time == time && rank == best_rank {
                        tied.push(index);
                    }
                }
            }
        }

        Ok(Latest::from_tied(tied))
    }

    /// Selected versions, borrowed from `versions`
    pub fn latest<'v, V: StampedVersion>(&self, versions: &'v [V]) -> Result<Latest<&'v V>> {
        Ok(self.latest_index(versions)?.map(|index| &versions[index]))
    }

    /// Selected versions of any chronology kind
    ///
    /// A stamp record has no versions and always yields `Latest::Empty`.
    pub fn latest_entity<'e>(&self, entity: &'e Entity) -> Result<Latest<EntityVersion<'e>>> {
        let versions = entity.versions();
        Ok(self.latest_index(&versions)?.map(|index| versions[index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termstore_entity::ConceptVersion;

    fn stamps(entries: &[(i32, i64, i32)]) -> HashMap<Nid, Stamp> {
        entries
            .iter()
            .map(|&(nid, time, module)| {
                (
                    Nid::new(nid),
                    Stamp {
                        status: Nid::new(1),
                        time: StampTime::from_millis(time),
                        author: Nid::new(2),
                        module: Nid::new(module),
                        path: Nid::new(3),
                    },
                )
            })
            .collect()
    }

    fn versions(stamp_nids: &[i32]) -> Vec<ConceptVersion> {
        stamp_nids.iter().map(|s| ConceptVersion::new(Nid::new(*s))).collect()
    }

    #[test]
    fn test_latest_time_wins() {
        let table = stamps(&[(10, 100, 5), (11, 300, 5), (12, 200, 5)]);
        let calculator = StampCalculator::new(StampCoordinate::latest_on(Nid::new(3)), &table);
        let latest = calculator.latest_index(&versions(&[10, 11, 12])).unwrap();
        assert_eq!(latest, Latest::Single(1));
    }

    #[test]
    fn test_empty_chronology_is_empty() {
        let table = stamps(&[]);
        let calculator = StampCalculator::new(StampCoordinate::latest_on(Nid::new(3)), &table);
        let latest = calculator.latest_index::<ConceptVersion>(&[]).unwrap();
        assert_eq!(latest, Latest::Empty);
    }

    #[test]
    fn test_unknown_stamp_is_error() {
        let table = stamps(&[(10, 100, 5)]);
        let calculator = StampCalculator::new(StampCoordinate::latest_on(Nid::new(3)), &table);
        let err = calculator.latest_index(&versions(&[10, 99])).unwrap_err();
        assert!(err.is_identity_error());
    }

    #[test]
    fn test_contradiction_keeps_chronology_order() {
        let table = stamps(&[(10, 100, 5), (11, 100, 5), (12, 50, 5)]);
        let calculator = StampCalculator::new(StampCoordinate::latest_on(Nid::new(3)), &table);
        let latest = calculator.latest_index(&versions(&[11, 12, 10])).unwrap();
        assert_eq!(latest, Latest::Contradiction(vec![0, 2]));
    }
}
