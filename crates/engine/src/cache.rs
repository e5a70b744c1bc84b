//! Latest-version cache
//!
//! Results are keyed by `(nid, coordinate)` and held outside the
//! chronologies. Appending to a chronology invalidates its nid; committing
//! or canceling a stamp clears everything.
//!
//! A reader records the epoch before it reads the chronology and may only
//! insert if no invalidation happened since, so a result computed from a
//! stale chronology is never cached.

use crate::FxBuildHasher;
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use termstore_coordinate::{Latest, StampCoordinate};
use termstore_core::Nid;
use tracing::warn;

/// Cached version positions per nid and coordinate
pub struct LatestCache {
    entries: DashMap<Nid, FxHashMap<StampCoordinate, Latest<usize>>, FxBuildHasher>,
    epoch: AtomicU64,
    len: AtomicUsize,
    capacity: usize,
}

impl LatestCache {
    /// Cache holding at most `capacity` results; zero disables caching
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_hasher(FxBuildHasher::default()),
            epoch: AtomicU64::new(0),
            len: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Current invalidation epoch; pass it back to [`LatestCache::insert`]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Cached result
    pub fn get(&self, nid: Nid, coordinate: &StampCoordinate) -> Option<Latest<usize>> {
        self.entries
            .get(&nid)
            .and_then(|per_nid| per_nid.get(coordinate).cloned())
    }

    /// Cache a result computed after observing `epoch`
    ///
    /// Dropped if anything was invalidated since.
    pub fn insert(
        &self,
        epoch: u64,
        nid: Nid,
        coordinate: &StampCoordinate,
        latest: Latest<usize>,
    ) {
        if self.capacity == 0 {
            return;
        }
        if self.len.load(Ordering::Relaxed) >= self.capacity {
            warn!(
                target: "termstore::store",
                capacity = self.capacity,
                "Latest cache full, clearing"
            );
            self.evict_all();
        }

        if self.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        let mut per_nid = self.entries.entry(nid).or_default();
        // checked again under the shard lock: invalidate bumps the epoch
        // before it takes the same lock to remove
        if self.epoch.load(Ordering::SeqCst) != epoch {
            drop(per_nid);
            self.entries.remove_if(&nid, |_, per_nid| per_nid.is_empty());
            return;
        }
        if per_nid.insert(coordinate.clone(), latest).is_none() {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Forget every result for `nid`
    pub fn invalidate(&self, nid: Nid) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some((_, removed)) = self.entries.remove(&nid) {
            let removed = removed.len();
            let _ = self
                .len
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                    Some(n.saturating_sub(removed))
                });
        }
    }

    /// Forget everything
    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.evict_all();
    }

    // capacity eviction: results stay valid, so the epoch is untouched
    fn evict_all(&self) {
        self.entries.clear();
        self.len.store(0, Ordering::Relaxed);
    }

    /// Approximate number of cached results
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for LatestCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatestCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinate(path: i32) -> StampCoordinate {
        StampCoordinate::latest_on(Nid::new(path))
    }

    #[test]
    fn test_insert_and_get() {
        let cache = LatestCache::new(8);
        let epoch = cache.epoch();
        cache.insert(epoch, Nid::new(1), &coordinate(5), Latest::Single(0));
        assert_eq!(cache.get(Nid::new(1), &coordinate(5)), Some(Latest::Single(0)));
        assert_eq!(cache.get(Nid::new(1), &coordinate(6)), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_one_nid() {
        let cache = LatestCache::new(8);
        let epoch = cache.epoch();
        cache.insert(epoch, Nid::new(1), &coordinate(5), Latest::Single(0));
        cache.insert(epoch, Nid::new(2), &coordinate(5), Latest::Empty);
        cache.invalidate(Nid::new(1));
        assert_eq!(cache.get(Nid::new(1), &coordinate(5)), None);
        assert_eq!(cache.get(Nid::new(2), &coordinate(5)), Some(Latest::Empty));
    }

    #[test]
    fn test_stale_epoch_not_cached() {
        let cache = LatestCache::new(8);
        let epoch = cache.epoch();
        cache.invalidate(Nid::new(1));
        cache.insert(epoch, Nid::new(1), &coordinate(5), Latest::Single(3));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stale_inserts_leave_no_entries() {
        let cache = LatestCache::new(8);
        for nid in 0..100 {
            let epoch = cache.epoch();
            cache.invalidate(Nid::new(-1));
            cache.insert(epoch, Nid::new(nid), &coordinate(5), Latest::Empty);
        }
        assert_eq!(cache.entries.len(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overflow_clears() {
        let cache = LatestCache::new(2);
        for nid in 0..3 {
            let epoch = cache.epoch();
            cache.insert(epoch, Nid::new(nid), &coordinate(5), Latest::Empty);
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(Nid::new(2), &coordinate(5)), Some(Latest::Empty));
    }

    #[test]
    fn test_zero_capacity_disables() {
        let cache = LatestCache::new(0);
        cache.insert(cache.epoch(), Nid::new(1), &coordinate(5), Latest::Empty);
        assert!(cache.is_empty());
    }
}
