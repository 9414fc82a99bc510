//! Slot → original index mapping per instanced mesh.
//!
//! Renderers compact their storage when instances are removed, so a slot
//! number is not a stable identity. The tracker records, for every current
//! slot of a mesh, the index that instance had when the mesh was first
//! observed. The first touch of a mesh takes the current order as the
//! baseline (identity mapping).
//!
//! Invariants:
//! - a mapping is never shorter than the mesh's live instance count
//! - a mapping is a permutation of `0..len`; relocations swap entries
//! - mappings never shrink; positions past the live count hold the
//!   original indices of removed instances

use bevy::prelude::*;
use std::collections::HashMap;
use std::hash::Hash;

use super::world::InstanceRelocation;

#[derive(Debug)]
pub struct InstanceTracker<K> {
    mappings: HashMap<K, Vec<usize>>,
}

impl<K> Default for InstanceTracker<K> {
    fn default() -> Self {
        Self {
            mappings: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash + std::fmt::Debug> InstanceTracker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tracked(&self, mesh: K) -> bool {
        self.mappings.contains_key(&mesh)
    }

    pub fn mapping(&self, mesh: K) -> Option<&[usize]> {
        self.mappings.get(&mesh).map(Vec::as_slice)
    }

    pub fn tracked_count(&self) -> usize {
        self.mappings.len()
    }

    /// Mapping of `mesh`, created as identity on first touch and extended
    /// with identity entries if the mesh grew past it.
    pub fn ensure_initialized(&mut self, mesh: K, instance_count: usize) -> &mut Vec<usize> {
        let mapping = self.mappings.entry(mesh).or_default();
        if mapping.len() < instance_count {
            let start = mapping.len();
            mapping.extend(start..instance_count);
        }
        mapping
    }

    /// Original index of the instance currently at `slot`.
    pub fn original_index(&mut self, mesh: K, instance_count: usize, slot: usize) -> Option<usize> {
        self.ensure_initialized(mesh, instance_count).get(slot).copied()
    }

    /// Declare that `slot` now holds the instance with `original` index.
    ///
    /// If `original` is already listed elsewhere (a removed instance in the
    /// tail), the two entries trade places so the mapping stays a permutation.
    pub fn set_original_index(&mut self, mesh: K, instance_count: usize, slot: usize, original: usize) {
        let required = instance_count.max(slot + 1).max(original + 1);
        let mapping = self.ensure_initialized(mesh, required);

        match mapping.iter().position(|&value| value == original) {
            Some(position) => mapping.swap(position, slot),
            None => mapping[slot] = original,
        }
    }

    /// Apply renderer compaction events. Meshes that were never touched keep
    /// no mapping and ignore relocations; their first touch takes the
    /// compacted order as baseline.
    pub fn on_relocated(&mut self, mesh: K, relocations: &[InstanceRelocation]) {
        let Some(mapping) = self.mappings.get_mut(&mesh) else {
            return;
        };

        for relocation in relocations {
            let required = relocation.old_slot.max(relocation.new_slot) + 1;
            if mapping.len() < required {
                let start = mapping.len();
                mapping.extend(start..required);
            }
            mapping.swap(relocation.old_slot, relocation.new_slot);
        }
    }

    /// Original → current slot for every original index the mapping knows.
    pub fn reverse_mapping(&self, mesh: K) -> Option<Vec<Option<usize>>> {
        let mapping = self.mappings.get(&mesh)?;
        let len = mapping.iter().copied().max().map_or(0, |max| max + 1);
        let mut reverse = vec![None; len];
        for (slot, &original) in mapping.iter().enumerate() {
            reverse[original] = Some(slot);
        }
        Some(reverse)
    }

    /// Keep only the mappings of meshes for which `keep` holds.
    pub fn retain(&mut self, mut keep: impl FnMut(K) -> bool) {
        self.mappings.retain(|mesh, _| keep(*mesh));
    }

    /// Drop the mapping of a mesh that no longer exists.
    pub fn forget(&mut self, mesh: K) {
        if self.mappings.remove(&mesh).is_some() {
            trace!("Forgot instance mapping of {:?}", mesh);
        }
    }
}
