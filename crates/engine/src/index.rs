//! Secondary indexes over semantics
//!
//! - semantic nid -> pattern nid, a persisted `SpinedIntIntMap`
//! - referenced component -> semantic nids, in memory and rebuilt at open
//!
//! Both only grow: a semantic's pattern and referenced component never
//! change once stored.

use crate::FxBuildHasher;
use dashmap::DashMap;
use rayon::prelude::*;
use smallvec::SmallVec;
use std::path::Path;
use termstore_core::{Nid, Result};
use termstore_storage::{SpineLayout, SpinedIntIntMap};

pub(crate) struct SemanticIndex {
    pattern_of: SpinedIntIntMap,
    by_component: DashMap<Nid, SmallVec<[Nid; 4]>, FxBuildHasher>,
}

impl SemanticIndex {
    /// `layout` is the entity map's; the entity map has already gap-checked
    /// every semantic nid recorded here
    pub(crate) fn new(layout: SpineLayout) -> Self {
        Self {
            pattern_of: SpinedIntIntMap::with_layout(layout.without_gap_limit()),
            by_component: DashMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Record a semantic; repeated calls for the same semantic are no-ops
    pub(crate) fn record(&self, semantic: Nid, component: Nid, pattern: Nid) -> Result<()> {
        if self.pattern_of.value(semantic.get()) != Some(pattern.get()) {
            self.pattern_of.put(semantic.get(), pattern.get())?;
        }
        self.link_component(semantic, component);
        Ok(())
    }

    /// Component link only; used while rebuilding at open
    pub(crate) fn link_component(&self, semantic: Nid, component: Nid) {
        let mut semantics = self.by_component.entry(component).or_default();
        if !semantics.contains(&semantic) {
            semantics.push(semantic);
        }
    }

    pub(crate) fn pattern_of(&self, semantic: Nid) -> Option<Nid> {
        self.pattern_of.value(semantic.get()).map(Nid::new)
    }

    /// Semantics of `pattern`, in storage order
    pub(crate) fn semantics_of_pattern(&self, pattern: Nid) -> Vec<Nid> {
        let raw = pattern.get();
        self.pattern_of
            .slot_range()
            .into_par_iter()
            .filter(|(_, p)| *p == raw)
            .map(|(semantic, _)| Nid::new(semantic))
            .collect()
    }

    /// Semantics referencing `component`, sorted
    pub(crate) fn semantics_for_component(&self, component: Nid) -> Vec<Nid> {
        let mut semantics: Vec<Nid> = self
            .by_component
            .get(&component)
            .map(|entry| entry.iter().copied().collect())
            .unwrap_or_default();
        semantics.sort_unstable();
        semantics
    }

    /// Semantics of `pattern` referencing `component`, sorted
    pub(crate) fn semantics_for_component_of_pattern(
        &self,
        component: Nid,
        pattern: Nid,
    ) -> Vec<Nid> {
        let mut semantics = self.semantics_for_component(component);
        semantics.retain(|semantic| self.pattern_of(*semantic) == Some(pattern));
        semantics
    }

    pub(crate) fn load(&self, dir: &Path) -> Result<usize> {
        self.pattern_of.load(dir)
    }

    pub(crate) fn flush(&self, dir: &Path) -> Result<bool> {
        self.pattern_of.flush(dir)
    }
}
