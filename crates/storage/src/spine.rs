//! Spine addressing and the shared spine table
//!
//! A spined store partitions a signed 32-bit key space into fixed-size
//! spines. Keys are first remapped to `u32` so that both signs share one
//! addressing scheme without overlap:
//!
//! ```text
//! key >= 0  ->  key                     (0 ..= 2^31 - 1)
//! key <  0  ->  2^31 + (-key - 1)       (2^31 ..= 2^32 - 1)
//! ```
//!
//! Non-negative keys fill spines upward from spine 0. Negative keys fill
//! upward from the spine holding remapped index 2^31 as they grow away from
//! -1. Each of the two regions keeps its own high-water spine count, so a
//! store populated densely in both regions never looks like it has a gap.
//!
//! # Concurrency contract
//!
//! - Spine creation is create-if-absent through the DashMap entry API: two
//!   threads racing on the same spine converge on one winner.
//! - High-water counts only ever grow (`fetch_max`).
//! - Reads never create spines.

use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use termstore_core::{Error, Result};

/// Default number of slots per spine
pub const DEFAULT_SPINE_SIZE: u32 = 10_240;

/// Default number of spines a write may jump past a region's high-water mark
pub const DEFAULT_MAX_SPINE_GAP: u32 = 64;

/// Remapped index where the negative key region starts
pub const NEGATIVE_BASE: u32 = 1 << 31;

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Remap a signed key into the unsigned storage address space
#[inline]
pub const fn remap_key(key: i32) -> u32 {
    if key >= 0 {
        key as u32
    } else {
        // !key == -key - 1, which is non-negative for every negative key
        NEGATIVE_BASE + (!key) as u32
    }
}

/// Inverse of [`remap_key`]
#[inline]
pub const fn restore_key(remapped: u32) -> i32 {
    if remapped < NEGATIVE_BASE {
        remapped as i32
    } else {
        !((remapped - NEGATIVE_BASE) as i32)
    }
}

/// Spine geometry and growth policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpineLayout {
    spine_size: u32,
    max_spine_gap: u32,
}

impl SpineLayout {
    /// Validate and build a layout
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a zero spine size or a zero gap threshold.
    pub fn new(spine_size: u32, max_spine_gap: u32) -> Result<Self> {
        if spine_size == 0 {
            return Err(Error::Config("spine_size must be positive".to_string()));
        }
        if max_spine_gap == 0 {
            return Err(Error::Config("max_spine_gap must be positive".to_string()));
        }
        Ok(Self {
            spine_size,
            max_spine_gap,
        })
    }

    /// Slots per spine
    #[inline]
    pub fn spine_size(&self) -> u32 {
        self.spine_size
    }

    /// Gap threshold
    #[inline]
    pub fn max_spine_gap(&self) -> u32 {
        self.max_spine_gap
    }

    /// Same geometry with no gap threshold
    ///
    /// For maps keyed by nids another map has already admitted, whose own
    /// high-water marks lag behind that map's.
    pub fn without_gap_limit(self) -> Self {
        Self {
            max_spine_gap: u32::MAX,
            ..self
        }
    }

    /// Spine index and slot for a signed key
    #[inline]
    pub fn address(&self, key: i32) -> SpineAddress {
        let remapped = remap_key(key);
        SpineAddress {
            spine_index: remapped / self.spine_size,
            slot: (remapped % self.spine_size) as usize,
        }
    }

    /// Signed key for a spine index and slot, `None` past the end of the key space
    #[inline]
    pub fn key_at(&self, spine_index: u32, slot: usize) -> Option<i32> {
        let remapped = spine_index as u64 * self.spine_size as u64 + slot as u64;
        u32::try_from(remapped).ok().map(restore_key)
    }

    /// First spine of the negative region
    #[inline]
    pub fn negative_base_spine(&self) -> u32 {
        NEGATIVE_BASE / self.spine_size
    }

    /// Region (0 = non-negative, 1 = negative) and offset of a spine within it
    #[inline]
    fn region_of(&self, spine_index: u32) -> (usize, u32) {
        let base = self.negative_base_spine();
        if spine_index >= base {
            (1, spine_index - base)
        } else {
            (0, spine_index)
        }
    }
}

impl Default for SpineLayout {
    fn default() -> Self {
        Self {
            spine_size: DEFAULT_SPINE_SIZE,
            max_spine_gap: DEFAULT_MAX_SPINE_GAP,
        }
    }
}

/// Location of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpineAddress {
    /// Spine holding the key
    pub spine_index: u32,
    /// Slot within the spine
    pub slot: usize,
}

/// Storage behind one spine
///
/// Implemented by the integer and byte-array spines. Each spine carries its
/// own dirty flag so flushes rewrite only what changed.
pub trait SpineSlots: Send + Sync {
    /// Value yielded for a populated slot
    type Value: Send;

    /// Value in a slot, `None` when the slot is empty
    fn value_at(&self, slot: usize) -> Option<Self::Value>;

    /// Number of slots
    fn slot_count(&self) -> usize;

    /// Dirty flag of this spine
    fn dirty_flag(&self) -> &AtomicBool;

    /// Record a mutation (call after the slot is written)
    #[inline]
    fn mark_dirty(&self) {
        self.dirty_flag().store(true, Ordering::Release);
    }

    /// Clear and return the dirty flag
    #[inline]
    fn take_dirty(&self) -> bool {
        self.dirty_flag().swap(false, Ordering::AcqRel)
    }

    /// Current dirty flag
    #[inline]
    fn is_dirty(&self) -> bool {
        self.dirty_flag().load(Ordering::Acquire)
    }
}

/// Sparse table of spines shared by the spined maps
pub(crate) struct SpineTable<S> {
    layout: SpineLayout,
    spines: DashMap<u32, Arc<S>, FxBuildHasher>,
    /// Spine counts of the non-negative and negative regions
    high_water: [AtomicU32; 2],
}

impl<S: SpineSlots> SpineTable<S> {
    pub(crate) fn new(layout: SpineLayout) -> Self {
        Self {
            layout,
            spines: DashMap::default(),
            high_water: [AtomicU32::new(0), AtomicU32::new(0)],
        }
    }

    #[inline]
    pub(crate) fn layout(&self) -> &SpineLayout {
        &self.layout
    }

    /// Existing spine, never creates
    #[inline]
    pub(crate) fn get(&self, spine_index: u32) -> Option<Arc<S>> {
        self.spines.get(&spine_index).map(|s| Arc::clone(s.value()))
    }

    /// Existing spine or a freshly created one, subject to the gap threshold
    pub(crate) fn get_or_create(
        &self,
        key: i32,
        spine_index: u32,
        make: impl FnOnce() -> S,
    ) -> Result<Arc<S>> {
        if let Some(spine) = self.get(spine_index) {
            return Ok(spine);
        }

        let (region, offset) = self.layout.region_of(spine_index);
        let high_water = self.high_water[region].load(Ordering::Acquire);
        if offset > high_water.saturating_add(self.layout.max_spine_gap) {
            return Err(Error::SpineGap {
                key,
                spine_index,
                high_water,
                max_gap: self.layout.max_spine_gap,
            });
        }

        let spine = Arc::clone(
            self.spines
                .entry(spine_index)
                .or_insert_with(|| Arc::new(make()))
                .value(),
        );
        self.high_water[region].fetch_max(offset + 1, Ordering::AcqRel);
        Ok(spine)
    }

    /// Install a spine read from disk
    pub(crate) fn install(&self, spine_index: u32, spine: S) {
        let (region, offset) = self.layout.region_of(spine_index);
        self.spines.insert(spine_index, Arc::new(spine));
        self.high_water[region].fetch_max(offset + 1, Ordering::AcqRel);
    }

    /// Raise the region high-water marks (never lowers them)
    pub(crate) fn raise_high_water(&self, counts: [u32; 2]) {
        for (hw, count) in self.high_water.iter().zip(counts) {
            hw.fetch_max(count, Ordering::AcqRel);
        }
    }

    /// High-water spine counts of both regions
    pub(crate) fn high_water(&self) -> [u32; 2] {
        [
            self.high_water[0].load(Ordering::Acquire),
            self.high_water[1].load(Ordering::Acquire),
        ]
    }

    /// Number of materialized spines
    pub(crate) fn len(&self) -> usize {
        self.spines.len()
    }

    /// Materialized spines in storage order
    pub(crate) fn sorted_spines(&self) -> Vec<(u32, Arc<S>)> {
        let mut spines: Vec<(u32, Arc<S>)> = self
            .spines
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        spines.sort_unstable_by_key(|(index, _)| *index);
        spines
    }
}
