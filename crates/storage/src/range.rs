//! Splittable slot ranges for sequential and parallel traversal
//!
//! A `SlotRange` is a snapshot of the materialized spines (the `Arc`s, not
//! the slot contents) plus a half-open window of flat slot positions over
//! them. Sequential iteration walks the window; parallel traversal hands the
//! range to `rayon::iter::split`, which halves it until pieces are small.
//!
//! Slots written after the range was taken may or may not be observed.
//! Spines created after the range was taken are never observed.

use crate::spine::{SpineLayout, SpineSlots};
use rayon::iter::ParallelIterator;
use std::sync::Arc;

/// Ranges at or below this many slots are not split further
pub const MIN_SPLIT_SLOTS: usize = 1024;

/// Window over the populated slots of a spined map
pub struct SlotRange<S> {
    spines: Arc<[(u32, Arc<S>)]>,
    layout: SpineLayout,
    start: usize,
    end: usize,
}

impl<S: SpineSlots> SlotRange<S> {
    pub(crate) fn new(spines: Vec<(u32, Arc<S>)>, layout: SpineLayout) -> Self {
        let end = spines.len() * layout.spine_size() as usize;
        Self {
            spines: spines.into(),
            layout,
            start: 0,
            end,
        }
    }

    /// Slots (populated or not) left in the window
    pub fn remaining_slots(&self) -> usize {
        self.end - self.start
    }

    /// Halve the window, leaving small windows whole
    pub fn split(mut self) -> (Self, Option<Self>) {
        let len = self.remaining_slots();
        if len <= MIN_SPLIT_SLOTS {
            return (self, None);
        }
        let mid = self.start + len / 2;
        let upper = Self {
            spines: Arc::clone(&self.spines),
            layout: self.layout,
            start: mid,
            end: self.end,
        };
        self.end = mid;
        (self, Some(upper))
    }

    /// Parallel iterator over `(key, value)` of every populated slot
    pub fn into_par_iter(self) -> impl ParallelIterator<Item = (i32, S::Value)>
    where
        S: 'static,
    {
        rayon::iter::split(self, Self::split).flat_map_iter(|range| range)
    }
}

impl<S: SpineSlots> Iterator for SlotRange<S> {
    type Item = (i32, S::Value);

    fn next(&mut self) -> Option<Self::Item> {
        let spine_size = self.layout.spine_size() as usize;
        while self.start < self.end {
            let position = self.start;
            self.start += 1;

            let (spine_index, spine) = &self.spines[position / spine_size];
            let slot = position % spine_size;
            if let Some(value) = spine.value_at(slot) {
                if let Some(key) = self.layout.key_at(*spine_index, slot) {
                    return Some((key, value));
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining_slots()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct EvenSlots {
        size: usize,
        dirty: AtomicBool,
    }

    impl SpineSlots for EvenSlots {
        type Value = usize;

        fn value_at(&self, slot: usize) -> Option<usize> {
            (slot % 2 == 0).then_some(slot)
        }

        fn slot_count(&self) -> usize {
            self.size
        }

        fn dirty_flag(&self) -> &AtomicBool {
            &self.dirty
        }
    }

    fn range(spines: u32, size: u32) -> SlotRange<EvenSlots> {
        let layout = SpineLayout::new(size, 4).unwrap();
        let spines = (0..spines)
            .map(|i| {
                (
                    i,
                    Arc::new(EvenSlots {
                        size: size as usize,
                        dirty: AtomicBool::new(false),
                    }),
                )
            })
            .collect();
        SlotRange::new(spines, layout)
    }

    #[test]
    fn test_sequential_yields_populated_slots_only() {
        let keys: Vec<i32> = range(2, 4).map(|(k, _)| k).collect();
        assert_eq!(keys, vec![0, 2, 4, 6]);
    }

    #[test]
    fn test_small_range_does_not_split() {
        let (_, upper) = range(1, 16).split();
        assert!(upper.is_none());
    }

    #[test]
    fn test_split_halves_cover_whole_range() {
        let whole: Vec<i32> = range(4, 1024).map(|(k, _)| k).collect();
        let (lower, upper) = range(4, 1024).split();
        let upper = upper.unwrap();
        assert_eq!(lower.remaining_slots(), 2048);
        assert_eq!(upper.remaining_slots(), 2048);

        let mut rejoined: Vec<i32> = lower.map(|(k, _)| k).collect();
        rejoined.extend(upper.map(|(k, _)| k));
        assert_eq!(rejoined, whole);
    }

    #[test]
    fn test_parallel_visits_same_multiset() {
        let mut sequential: Vec<i32> = range(8, 1024).map(|(k, _)| k).collect();
        let mut parallel: Vec<i32> = range(8, 1024).into_par_iter().map(|(k, _)| k).collect();
        sequential.sort_unstable();
        parallel.sort_unstable();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_empty_range() {
        assert_eq!(range(0, 16).count(), 0);
        assert_eq!(range(0, 16).into_par_iter().count(), 0);
    }
}
