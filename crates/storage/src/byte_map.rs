//! Spined byte-array map
//!
//! Holds the encoded bytes of every entity and stamp, keyed by nid. Each
//! spine is a slot vector behind a `parking_lot::RwLock`; readers share the
//! lock and receive an `Arc<[u8]>` they can keep after it is released.
//!
//! `accumulate_and_get` runs a merge function under the spine's write lock,
//! so concurrent merges into the same slot are serialized and neither is
//! lost.

use crate::range::SlotRange;
use crate::spine::{SpineLayout, SpineSlots, SpineTable};
use crate::spine_file;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use termstore_core::Result;
use tracing::{debug, info};

/// Spine of optional byte arrays
pub struct ByteSpine {
    slots: RwLock<Box<[Option<Arc<[u8]>>]>>,
    dirty: AtomicBool,
}

impl ByteSpine {
    fn empty(spine_size: u32) -> Self {
        Self {
            slots: RwLock::new(vec![None; spine_size as usize].into_boxed_slice()),
            dirty: AtomicBool::new(false),
        }
    }

    fn from_slots(slots: Vec<Option<Arc<[u8]>>>) -> Self {
        Self {
            slots: RwLock::new(slots.into_boxed_slice()),
            dirty: AtomicBool::new(false),
        }
    }
}

impl SpineSlots for ByteSpine {
    type Value = Arc<[u8]>;

    #[inline]
    fn value_at(&self, slot: usize) -> Option<Arc<[u8]>> {
        self.slots.read()[slot].clone()
    }

    fn slot_count(&self) -> usize {
        self.slots.read().len()
    }

    fn dirty_flag(&self) -> &AtomicBool {
        &self.dirty
    }
}

/// Concurrent sparse map from `i32` keys to byte arrays
pub struct SpinedByteArrayMap {
    table: SpineTable<ByteSpine>,
    flush_permit: Mutex<()>,
}

impl SpinedByteArrayMap {
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

    fn spine_for_write(&self, key: i32) -> Result<(Arc<ByteSpine>, usize)> {
        let addr = self.table.layout().address(key);
        let spine_size = self.table.layout().spine_size();
        let spine = self
            .table
            .get_or_create(key, addr.spine_index, || ByteSpine::empty(spine_size))?;
        Ok((spine, addr.slot))
    }

    // ========================================================================
    // Slot operations
    // ========================================================================

    /// Replace the bytes at `key`
    ///
    /// # Errors
    ///
    /// `Error::SpineGap` if the key lies far beyond the populated spines.
    pub fn put(&self, key: i32, bytes: impl Into<Arc<[u8]>>) -> Result<()> {
        let (spine, slot) = self.spine_for_write(key)?;
        spine.slots.write()[slot] = Some(bytes.into());
        spine.mark_dirty();
        Ok(())
    }

    /// Bytes at `key`
    pub fn get(&self, key: i32) -> Option<Arc<[u8]>> {
        let addr = self.table.layout().address(key);
        self.table
            .get(addr.spine_index)
            .and_then(|spine| spine.value_at(addr.slot))
    }

    /// True if `key` holds bytes
    pub fn contains_key(&self, key: i32) -> bool {
        let addr = self.table.layout().address(key);
        self.table
            .get(addr.spine_index)
            .map(|spine| spine.slots.read()[addr.slot].is_some())
            .unwrap_or(false)
    }

    /// Atomically merge into the bytes at `key`
    ///
    /// `merge` receives the current bytes (if any) and returns the bytes to
    /// store. It runs under the spine's write lock and must not touch this
    /// map. If `merge` fails the slot is left unchanged.
    pub fn accumulate_and_get(
        &self,
        key: i32,
        merge: impl FnOnce(Option<&[u8]>) -> Result<Vec<u8>>,
    ) -> Result<Arc<[u8]>> {
        let (spine, slot) = self.spine_for_write(key)?;
        let mut slots = spine.slots.write();
        let merged: Arc<[u8]> = merge(slots[slot].as_deref())?.into();
        slots[slot] = Some(Arc::clone(&merged));
        drop(slots);
        spine.mark_dirty();
        Ok(merged)
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// Visit every populated slot in storage order
    pub fn for_each(&self, mut visitor: impl FnMut(i32, &[u8])) {
        for (key, bytes) in self.slot_range() {
            visitor(key, &bytes);
        }
    }

    /// Splittable range over every populated slot
    pub fn slot_range(&self) -> SlotRange<ByteSpine> {
        SlotRange::new(self.table.sorted_spines(), *self.table.layout())
    }

    /// Visit every populated slot from the rayon pool
    pub fn par_for_each(&self, visitor: impl Fn(i32, &[u8]) + Sync + Send) {
        self.slot_range()
            .into_par_iter()
            .for_each(|(key, bytes)| visitor(key, &bytes));
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

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Read every spine file in `dir` into this map
    ///
    /// Checksums are verified; any bad file aborts the load.
    pub fn load(&self, dir: &Path) -> Result<usize> {
        let _permit = self.flush_permit.lock();
        let spine_size = self.table.layout().spine_size();

        self.table.raise_high_water(spine_file::read_spine_count(dir)?);

        let files = spine_file::list_spine_files(dir)?;
        for (spine_index, path) in &files {
            let slots = spine_file::read_byte_spine(path, spine_size)?;
            self.table
                .install(*spine_index, ByteSpine::from_slots(slots));
        }

        info!(
            target: "termstore::spine",
            dir = %dir.display(),
            spines = files.len(),
            "Loaded byte-array spines"
        );
        Ok(files.len())
    }

    /// Write every spine changed since the last flush
    pub fn flush(&self, dir: &Path) -> Result<bool> {
        let _permit = self.flush_permit.lock();
        fs::create_dir_all(dir)?;

        let mut written = 0usize;
        for (spine_index, spine) in self.table.sorted_spines() {
            if !spine.take_dirty() {
                continue;
            }
            let snapshot: Vec<Option<Arc<[u8]>>> = spine.slots.read().to_vec();
            let path = spine_file::spine_path(dir, spine_index);
            if let Err(e) = spine_file::write_byte_spine(&path, &snapshot) {
                spine.mark_dirty();
                return Err(e);
            }
            debug!(target: "termstore::spine", spine = spine_index, "Wrote byte-array spine");
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
                "Flushed byte-array spines"
            );
        }
        Ok(written > 0)
    }
}

impl Default for SpinedByteArrayMap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SpinedByteArrayMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpinedByteArrayMap")
            .field("layout", self.table.layout())
            .field("spines", &self.table.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use termstore_core::Error;

    fn small_map() -> SpinedByteArrayMap {
        SpinedByteArrayMap::with_layout(SpineLayout::new(8, 4).unwrap())
    }

    #[test]
    fn test_put_get() {
        let map = small_map();
        assert!(map.get(1).is_none());
        map.put(1, b"one".to_vec()).unwrap();
        map.put(-1, b"minus one".to_vec()).unwrap();
        assert_eq!(&*map.get(1).unwrap(), b"one");
        assert_eq!(&*map.get(-1).unwrap(), b"minus one");
        assert!(map.contains_key(1));
        assert!(!map.contains_key(2));
    }

    #[test]
    fn test_empty_bytes_are_present() {
        let map = small_map();
        map.put(3, Vec::new()).unwrap();
        assert!(map.contains_key(3));
        assert_eq!(map.get(3).unwrap().len(), 0);
    }

    #[test]
    fn test_accumulate_and_get() {
        let map = small_map();
        let append = |existing: Option<&[u8]>| -> Result<Vec<u8>> {
            let mut out = existing.map(<[u8]>::to_vec).unwrap_or_default();
            out.push(b'x');
            Ok(out)
        };
        map.accumulate_and_get(4, append).unwrap();
        let merged = map.accumulate_and_get(4, append).unwrap();
        assert_eq!(&*merged, b"xx");
    }

    #[test]
    fn test_failed_merge_leaves_slot_unchanged() {
        let map = small_map();
        map.put(4, b"keep".to_vec()).unwrap();
        let result = map.accumulate_and_get(4, |_| Err(Error::InvalidData("no".into())));
        assert!(result.is_err());
        assert_eq!(&*map.get(4).unwrap(), b"keep");
    }

    #[test]
    fn test_flush_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let map = small_map();
        for key in [0, 9, 17, -3] {
            map.put(key, format!("value {}", key).into_bytes()).unwrap();
        }
        assert!(map.flush(dir.path()).unwrap());
        assert!(!map.flush(dir.path()).unwrap());

        let reloaded = small_map();
        reloaded.load(dir.path()).unwrap();
        for key in [0, 9, 17, -3] {
            assert_eq!(reloaded.get(key), map.get(key));
        }
        assert_eq!(reloaded.len(), 4);
    }

    #[test]
    fn test_par_for_each_visits_every_slot() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let map = small_map();
        for key in 0..40 {
            map.put(key, vec![key as u8]).unwrap();
        }
        let total = AtomicUsize::new(0);
        map.par_for_each(|_, bytes| {
            total.fetch_add(bytes[0] as usize, Ordering::Relaxed);
        });
        assert_eq!(total.into_inner(), (0..40).sum::<usize>());
    }
}
