//! Spined integer map
//!
//! A concurrent map from signed 32-bit keys to 32-bit values, backed by
//! lazily created spines of atomic integers. Used for identifier-mapping
//! tables (e.g. semantic nid -> pattern nid).
//!
//! # Design
//!
//! - Each slot is an `AtomicI32`; single-slot get/put/update are atomic.
//!   There is no cross-slot transaction.
//! - `i32::MAX` marks an empty slot. Storing it is rejected with
//!   `Error::SentinelValue`.
//! - `flush` and `load` hold a single permit: at most one disk operation at
//!   a time. Slot reads and writes never wait on it.

use crate::range::SlotRange;
use crate::spine::{SpineLayout, SpineSlots, SpineTable};
use crate::spine_file;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use termstore_core::{Error, Result};
use tracing::{debug, info};

/// Value of an unpopulated slot
pub const SENTINEL: i32 = i32::MAX;

/// Spine of atomic integers
pub struct IntSpine {
    slots: Box<[AtomicI32]>,
    dirty: AtomicBool,
}

impl IntSpine {
    fn empty(spine_size: u32) -> Self {
        Self {
            slots: (0..spine_size).map(|_| AtomicI32::new(SENTINEL)).collect(),
            dirty: AtomicBool::new(false),
        }
    }

    fn from_values(values: Vec<i32>) -> Self {
        Self {
            slots: values.into_iter().map(AtomicI32::new).collect(),
            dirty: AtomicBool::new(false),
        }
    }

    fn snapshot(&self) -> Vec<i32> {
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .collect()
    }
}

impl SpineSlots for IntSpine {
    type Value = i32;

    #[inline]
    fn value_at(&self, slot: usize) -> Option<i32> {
        match self.slots[slot].load(Ordering::Acquire) {
            SENTINEL => None,
            value => Some(value),
        }
    }

    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn dirty_flag(&self) -> &AtomicBool {
        &self.dirty
    }
}

/// Concurrent sparse map from `i32` keys to `i32` values
pub struct SpinedIntIntMap {
    table: SpineTable<IntSpine>,
    flush_permit: Mutex<()>,
}

impl SpinedIntIntMap {
    /// Create an empty map with the default layout
    pub fn new() -> Self {
        Self::with_layout(SpineLayout::default())
    }

    /// Create an empty map with a specific layout
    pub fn with_layout(layout: SpineLayout) -> Self {
        Self {
            table: SpineTable::new(layout),
            flush_permit: Mutex::new(()),
        }
    }

    /// Layout in use
    pub fn layout(&self) -> &SpineLayout {
        self.table.layout()
    }

    // ========================================================================
    // Slot operations
    // ========================================================================

    /// Store a value
    ///
    /// # Errors
    ///
    /// - `Error::SentinelValue` if `value` is the empty-slot sentinel
    /// - `Error::SpineGap` if the key lies far beyond the populated spines
    pub fn put(&self, key: i32, value: i32) -> Result<()> {
        if value == SENTINEL {
            return Err(Error::SentinelValue { key, value });
        }
        let addr = self.table.layout().address(key);
        let spine_size = self.table.layout().spine_size();
        let spine = self
            .table
            .get_or_create(key, addr.spine_index, || IntSpine::empty(spine_size))?;
        spine.slots[addr.slot].store(value, Ordering::Release);
        spine.mark_dirty();
        Ok(())
    }

    /// Value at `key`, or [`SENTINEL`] if absent
    #[inline]
    pub fn get(&self, key: i32) -> i32 {
        let addr = self.table.layout().address(key);
        match self.table.get(addr.spine_index) {
            Some(spine) => spine.slots[addr.slot].load(Ordering::Acquire),
            None => SENTINEL,
        }
    }

    /// Value at `key`, `None` if absent
    #[inline]
    pub fn value(&self, key: i32) -> Option<i32> {
        match self.get(key) {
            SENTINEL => None,
            value => Some(value),
        }
    }

    /// True if `key` holds a value
    #[inline]
    pub fn contains_key(&self, key: i32) -> bool {
        self.get(key) != SENTINEL
    }

    /// Atomically replace the value at `key` with `update(current)`
    ///
    /// `update` receives [`SENTINEL`] for an empty slot and may be called
    /// more than once under contention. Returns the new value.
    ///
    /// # Errors
    ///
    /// - `Error::SentinelValue` if `update` produces the sentinel; the slot is
    ///   left unchanged
    /// - `Error::SpineGap` as for [`put`](Self::put)
    pub fn get_and_update(&self, key: i32, update: impl Fn(i32) -> i32) -> Result<i32> {
        let addr = self.table.layout().address(key);
        let spine_size = self.table.layout().spine_size();
        let spine = self
            .table
            .get_or_create(key, addr.spine_index, || IntSpine::empty(spine_size))?;

        let slot = &spine.slots[addr.slot];
        let mut current = slot.load(Ordering::Acquire);
        loop {
            let next = update(current);
            if next == SENTINEL {
                return Err(Error::SentinelValue { key, value: next });
            }
            match slot.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    spine.mark_dirty();
                    return Ok(next);
                }
                Err(actual) => current = actual,
            }
        }
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// Visit every populated slot in storage order
    ///
    /// Storage order is `0, 1, ..., i32::MAX` followed by `-1, -2, ..., i32::MIN`.
    pub fn for_each(&self, mut visitor: impl FnMut(i32, i32)) {
        for (key, value) in self.slot_range() {
            visitor(key, value);
        }
    }

    /// Splittable range over every populated slot
    pub fn slot_range(&self) -> SlotRange<IntSpine> {
        SlotRange::new(self.table.sorted_spines(), *self.table.layout())
    }

    /// Visit every populated slot from the rayon pool
    pub fn par_for_each(&self, visitor: impl Fn(i32, i32) + Sync + Send) {
        self.slot_range()
            .into_par_iter()
            .for_each(|(key, value)| visitor(key, value));
    }

    /// Populated values in parallel
    pub fn par_values(&self) -> impl ParallelIterator<Item = i32> {
        self.slot_range().into_par_iter().map(|(_, value)| value)
    }

    /// Populated values in storage order
    pub fn values(&self) -> impl Iterator<Item = i32> {
        self.slot_range().map(|(_, value)| value)
    }

    /// Number of populated slots (walks every spine)
    pub fn len(&self) -> usize {
        self.slot_range().count()
    }

    /// True if no slot is populated
    pub fn is_empty(&self) -> bool {
        self.slot_range().next().is_none()
    }

    /// Materialized spines
    pub fn spine_count(&self) -> usize {
        self.table.len()
    }

    /// Memory held by slot storage
    pub fn size_in_bytes(&self) -> usize {
        self.table.len() * self.table.layout().spine_size() as usize * std::mem::size_of::<i32>()
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Read every spine file in `dir` into this map
    ///
    /// Meant for a freshly created map. Any unreadable or malformed file
    /// aborts the whole load. Returns the number of spine files read.
    pub fn load(&self, dir: &Path) -> Result<usize> {
        let _permit = self.flush_permit.lock();
        let spine_size = self.table.layout().spine_size();

        self.table.raise_high_water(spine_file::read_spine_count(dir)?);

        let files = spine_file::list_spine_files(dir)?;
        for (spine_index, path) in &files {
            let values = spine_file::read_int_spine(path, spine_size)?;
            self.table
                .install(*spine_index, IntSpine::from_values(values));
        }

        info!(
            target: "termstore::spine",
            dir = %dir.display(),
            spines = files.len(),
            "Loaded integer spines"
        );
        Ok(files.len())
    }

    /// Write every spine changed since the last flush
    ///
    /// Returns true if any spine file was written. Untouched spines keep
    /// their files byte-for-byte.
    pub fn flush(&self, dir: &Path) -> Result<bool> {
        let _permit = self.flush_permit.lock();
        fs::create_dir_all(dir)?;

        let mut written = 0usize;
        for (spine_index, spine) in self.table.sorted_spines() {
            if !spine.take_dirty() {
                continue;
            }
            let path = spine_file::spine_path(dir, spine_index);
            if let Err(e) = spine_file::write_int_spine(&path, &spine.snapshot()) {
                spine.mark_dirty();
                return Err(e);
            }
            debug!(target: "termstore::spine", spine = spine_index, "Wrote integer spine");
            written += 1;
        }

        if written > 0 || !dir.join(spine_file::SPINE_COUNT_FILE).exists() {
            spine_file::write_spine_count(dir, self.table.high_water())?;
        }

        if written > 0 {
            info!(
                target: "termstore::spine",
                dir = %dir.display(),
                spines = written,
                "Flushed integer spines"
            );
        }
        Ok(written > 0)
    }
}

impl Default for SpinedIntIntMap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SpinedIntIntMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpinedIntIntMap")
            .field("layout", self.table.layout())
            .field("spines", &self.table.len())
            .field("high_water", &self.table.high_water())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn small_map() -> SpinedIntIntMap {
        SpinedIntIntMap::with_layout(SpineLayout::new(16, 4).unwrap())
    }

    #[test]
    fn test_get_before_put_is_sentinel() {
        let map = small_map();
        assert_eq!(map.get(5), SENTINEL);
        assert_eq!(map.get(-5), SENTINEL);
        assert_eq!(map.get(i32::MIN), SENTINEL);
        assert!(!map.contains_key(5));
        // reads never materialize spines
        assert_eq!(map.spine_count(), 0);
    }

    #[test]
    fn test_put_get() {
        let map = small_map();
        map.put(5, 50).unwrap();
        map.put(-5, -50).unwrap();
        assert_eq!(map.get(5), 50);
        assert_eq!(map.get(-5), -50);
        assert_eq!(map.value(6), None);
        map.put(5, 51).unwrap();
        assert_eq!(map.get(5), 51);
    }

    #[test]
    fn test_put_sentinel_is_rejected() {
        let map = small_map();
        let err = map.put(1, SENTINEL).unwrap_err();
        assert!(matches!(err, Error::SentinelValue { key: 1, .. }));
        assert!(!map.contains_key(1));
    }

    #[test]
    fn test_put_far_ahead_fails_loudly() {
        let map = small_map();
        map.put(0, 1).unwrap();
        let err = map.put(16 * 1000, 1).unwrap_err();
        assert!(matches!(err, Error::SpineGap { .. }));
    }

    #[test]
    fn test_get_and_update() {
        let map = small_map();
        assert_eq!(map.get_and_update(3, |v| if v == SENTINEL { 1 } else { v + 1 }).unwrap(), 1);
        assert_eq!(map.get_and_update(3, |v| v + 1).unwrap(), 2);
        assert!(map.get_and_update(3, |_| SENTINEL).is_err());
        assert_eq!(map.get(3), 2);
    }

    #[test]
    fn test_for_each_reconstructs_keys_in_storage_order() {
        let map = small_map();
        for key in [-2, 20, 0, -1, 3] {
            map.put(key, key * 10).unwrap();
        }
        let mut seen = Vec::new();
        map.for_each(|k, v| seen.push((k, v)));
        assert_eq!(seen, vec![(0, 0), (3, 30), (20, 200), (-1, -10), (-2, -20)]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let map = small_map();
        for key in 0..200 {
            if key % 3 != 0 {
                map.put(key, key).unwrap();
            }
        }
        let mut sequential: Vec<i32> = map.values().collect();
        let mut parallel: Vec<i32> = map.par_values().collect();
        sequential.sort_unstable();
        parallel.sort_unstable();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_flush_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let map = small_map();
        for key in [1, 17, 33, -1, -40] {
            map.put(key, key + 1000).unwrap();
        }
        assert!(map.flush(dir.path()).unwrap());

        let reloaded = small_map();
        assert_eq!(reloaded.load(dir.path()).unwrap(), map.spine_count());
        let mut before = Vec::new();
        let mut after = Vec::new();
        map.for_each(|k, v| before.push((k, v)));
        reloaded.for_each(|k, v| after.push((k, v)));
        assert_eq!(before, after);
    }

    #[test]
    fn test_flush_without_changes_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let map = small_map();
        map.put(1, 1).unwrap();
        assert!(map.flush(dir.path()).unwrap());
        assert!(!map.flush(dir.path()).unwrap());
    }

    #[test]
    fn test_size_in_bytes() {
        let map = small_map();
        assert_eq!(map.size_in_bytes(), 0);
        map.put(1, 1).unwrap();
        assert_eq!(map.size_in_bytes(), 16 * 4);
    }
}
