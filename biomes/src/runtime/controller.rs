//! Instance controller: removal, restoration and reconciliation of spawned
//! instances against regenerated or streamed content.
//!
//! Removed instances are stored as [`InstanceRecord`]s in groups. A group is
//! either a main spawner (by GUID) or a partition cell (by grid key). Group
//! positions in the `mains` / `partitions` registries are embedded in
//! handles, so both registries are append-only.
//!
//! Record identity is (original index, component name). The original index
//! comes from the [`InstanceTracker`], which follows the renderer's slot
//! compaction.

use bevy::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::marker::PhantomData;
use uuid::Uuid;

use super::handle::{
    GroupKey, GroupSlot, InstanceHandle, InstanceRecord, PartitionKey, SavedTransform,
};
use super::snapshot::{MainInstances, PartitionedInstances, PersistentInstances};
use super::tracker::InstanceTracker;
use super::world::{ActorRole, InstanceRelocation, InstanceWorld, InstancedMesh};
use crate::spawn_preset::{InstanceUserData, SpawnCandidate};
use crate::tags::{read_tag, write_tag};

/// A removal that passed every check, waiting for the renderer.
struct PendingRemoval {
    group: GroupKey,
    handle: InstanceHandle,
    record: InstanceRecord,
}

/// Outcome of applying a snapshot to the world.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Groups whose removals were fully applied
    pub applied: usize,
    /// Groups whose actor is not loaded; applied when it streams in
    pub deferred: usize,
    /// Groups where some removals could not be applied
    pub failed: Vec<GroupKey>,
}

impl ReconcileSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Resource)]
pub struct InstanceController<W: InstanceWorld> {
    // === Group registries (append-only) ===
    mains: Vec<Uuid>,
    partitions: Vec<PartitionKey>,

    // === Removed instances ===
    main_instances: HashMap<Uuid, Vec<InstanceRecord>>,
    partitioned_instances: HashMap<PartitionKey, Vec<InstanceRecord>>,

    // === Runtime caches ===
    /// Meshes per actor, refreshed on lookup misses
    mesh_cache: HashMap<W::ActorId, Vec<W::MeshId>>,
    /// Partition actors whose stored removals were applied since they loaded
    applied_partitions: HashSet<W::ActorId>,
    tracker: InstanceTracker<W::MeshId>,

    _world: PhantomData<fn() -> W>,
}

impl<W: InstanceWorld> Default for InstanceController<W> {
    fn default() -> Self {
        Self {
            mains: Vec::new(),
            partitions: Vec::new(),
            main_instances: HashMap::new(),
            partitioned_instances: HashMap::new(),
            mesh_cache: HashMap::new(),
            applied_partitions: HashSet::new(),
            tracker: InstanceTracker::new(),
            _world: PhantomData,
        }
    }
}

impl<W: InstanceWorld> InstanceController<W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracker(&self) -> &InstanceTracker<W::MeshId> {
        &self.tracker
    }

    pub fn mains(&self) -> &[Uuid] {
        &self.mains
    }

    pub fn partitions(&self) -> &[PartitionKey] {
        &self.partitions
    }

    /// Removed-instance records of a group.
    pub fn records(&self, group: &GroupKey) -> &[InstanceRecord] {
        let records = match group {
            GroupKey::Main(guid) => self.main_instances.get(guid),
            GroupKey::Partition(key) => self.partitioned_instances.get(key),
        };
        records.map(Vec::as_slice).unwrap_or_default()
    }

    pub fn removed_count(&self) -> usize {
        self.main_instances.values().map(Vec::len).sum::<usize>()
            + self.partitioned_instances.values().map(Vec::len).sum::<usize>()
    }

    // ========================================================================
    // Removal / restoration
    // ========================================================================

    /// Remove a live instance, returning a durable handle to it.
    ///
    /// Returns an invalid handle, and changes nothing, when the slot is not
    /// live, the owning actor is not a generation actor or the renderer
    /// refuses the removal.
    pub fn remove_instance(&mut self, world: &mut W, mesh: W::MeshId, slot: usize) -> InstanceHandle {
        let Some(pending) = self.prepare_removal(world, mesh, slot) else {
            return InstanceHandle::default();
        };

        let Some(relocations) =
            world.mesh_mut(mesh).and_then(|instances| instances.remove_instances(&[slot]))
        else {
            warn!("Renderer refused to remove slot {} of {:?}", slot, mesh);
            return InstanceHandle::default();
        };
        self.tracker.on_relocated(mesh, &relocations);

        // Accepted: the group gets its registry position now
        match pending.group {
            GroupKey::Main(guid) => {
                self.main_index(guid);
            }
            GroupKey::Partition(key) => {
                self.partition_index(key);
            }
        }
        self.records_entry(pending.group).push(pending.record);
        pending.handle
    }

    /// Build the record and handle for a removal without mutating any
    /// registry.
    fn prepare_removal(&mut self, world: &W, mesh: W::MeshId, slot: usize) -> Option<PendingRemoval> {
        let instances = world.mesh(mesh)?;
        if !instances.is_valid_instance(slot) {
            return None;
        }

        let Some(owner) = world.mesh_owner(mesh) else {
            error!("Instanced mesh {:?} has no owning actor", mesh);
            debug_assert!(false, "instanced mesh without owner");
            return None;
        };
        let role = world.actor_role(owner)?;
        let transform = instances.instance_transform(slot)?;

        let original = self
            .tracker
            .original_index(mesh, instances.instance_count(), slot)?;
        let id = i32::try_from(original).ok()?;
        let tag = read_tag(instances, slot);
        let component_name = instances.name().to_string();

        let group = match role {
            ActorRole::Spawner(guid) => GroupKey::Main(guid),
            ActorRole::Partition(key) => GroupKey::Partition(key),
        };
        let Some(handle) = InstanceHandle::new(self.group_slot(&group), component_name.clone(), id) else {
            error!("Group registry overflow, {:?} cannot be addressed by a handle", group);
            return None;
        };

        if self
            .records(&group)
            .iter()
            .any(|record| record.id == id && record.component_name == component_name)
        {
            error!(
                "Instance {} of '{}' is already recorded as removed in {:?}",
                id, component_name, group
            );
            debug_assert!(false, "duplicate removed-instance record");
            return None;
        }

        Some(PendingRemoval {
            group,
            handle,
            record: InstanceRecord {
                id,
                transform: SavedTransform::from(transform),
                component_name,
                set_index: tag.set_index,
                item_index: tag.item_index,
            },
        })
    }

    /// Bring a removed instance back.
    ///
    /// The record is consumed whenever it is found, even if the owning actor
    /// is not loaded and nothing could be re-created. Returns `false` only
    /// when no record matches the handle.
    pub fn restore_instance(&mut self, world: &mut W, handle: &InstanceHandle) -> bool {
        let Some((group, index)) = self.find_record(handle) else {
            return false;
        };
        let Some(record) = self.records_mut(&group).map(|records| records.swap_remove(index)) else {
            return false;
        };

        match self.group_actor(world, &group) {
            Some(actor) => {
                if !self.restore_record(world, actor, &record) {
                    warn!(
                        "Could not re-create instance {} of '{}' in {:?}",
                        record.id, record.component_name, group
                    );
                }
            }
            None => debug!(
                "Owner of {:?} is not loaded, restore of instance {} of '{}' consumed",
                group, record.id, record.component_name
            ),
        }
        true
    }

    /// Re-create a record's instance in a loaded actor.
    fn restore_record(&mut self, world: &mut W, actor: W::ActorId, record: &InstanceRecord) -> bool {
        let Some(mesh) = self.find_actor_mesh(world, actor, &record.component_name) else {
            return false;
        };
        let Ok(original) = usize::try_from(record.id) else {
            return false;
        };
        let Some(instances) = world.mesh_mut(mesh) else {
            return false;
        };

        // Baseline must exist before the new slot appears
        self.tracker.ensure_initialized(mesh, instances.instance_count());
        let slot = instances.add_instance(record.transform.into());
        write_tag(instances, slot, record.tag());
        self.tracker
            .set_original_index(mesh, instances.instance_count(), slot, original);
        true
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Transform of a removed instance.
    pub fn instance_transform(&self, handle: &InstanceHandle) -> Option<Transform> {
        self.find_instance_record(handle)
            .map(|record| record.transform.into())
    }

    /// Spawn candidate that produced a removed instance. Needs the owning
    /// actor to be loaded to reach its preset.
    pub fn spawn_candidate<'w>(&self, world: &'w W, handle: &InstanceHandle) -> Option<&'w SpawnCandidate> {
        let (group, index) = self.find_record(handle)?;
        let record = self.records(&group).get(index)?;
        let actor = self.group_actor(world, &group)?;
        world.spawn_preset(actor)?.candidate(record.tag())
    }

    pub fn user_data<'w>(&self, world: &'w W, handle: &InstanceHandle) -> Option<&'w InstanceUserData> {
        self.spawn_candidate(world, handle)?.user_data.as_ref()
    }

    fn find_instance_record(&self, handle: &InstanceHandle) -> Option<&InstanceRecord> {
        let (group, index) = self.find_record(handle)?;
        self.records(&group).get(index)
    }

    fn find_record(&self, handle: &InstanceHandle) -> Option<(GroupKey, usize)> {
        if !handle.is_valid() {
            return None;
        }
        let group = match handle.group_slot()? {
            GroupSlot::Main(index) => GroupKey::Main(*self.mains.get(index)?),
            GroupSlot::Partition(index) => GroupKey::Partition(*self.partitions.get(index)?),
        };
        let index = self
            .records(&group)
            .iter()
            .position(|record| record.matches(handle))?;
        Some((group, index))
    }

    fn group_actor(&self, world: &W, group: &GroupKey) -> Option<W::ActorId> {
        match group {
            GroupKey::Main(guid) => world.find_spawner(*guid),
            GroupKey::Partition(key) => world.find_partition(*key),
        }
    }

    /// Registry position of a group, or the position it would get.
    fn group_slot(&self, group: &GroupKey) -> GroupSlot {
        match group {
            GroupKey::Main(guid) => GroupSlot::Main(
                self.mains
                    .iter()
                    .position(|existing| existing == guid)
                    .unwrap_or(self.mains.len()),
            ),
            GroupKey::Partition(key) => GroupSlot::Partition(
                self.partitions
                    .iter()
                    .position(|existing| existing == key)
                    .unwrap_or(self.partitions.len()),
            ),
        }
    }

    fn main_index(&mut self, guid: Uuid) -> usize {
        match self.mains.iter().position(|existing| *existing == guid) {
            Some(index) => index,
            None => {
                self.mains.push(guid);
                self.mains.len() - 1
            }
        }
    }

    fn partition_index(&mut self, key: PartitionKey) -> usize {
        match self.partitions.iter().position(|existing| *existing == key) {
            Some(index) => index,
            None => {
                self.partitions.push(key);
                self.partitions.len() - 1
            }
        }
    }

    fn records_entry(&mut self, group: GroupKey) -> &mut Vec<InstanceRecord> {
        match group {
            GroupKey::Main(guid) => self.main_instances.entry(guid).or_default(),
            GroupKey::Partition(key) => self.partitioned_instances.entry(key).or_default(),
        }
    }

    fn records_mut(&mut self, group: &GroupKey) -> Option<&mut Vec<InstanceRecord>> {
        match group {
            GroupKey::Main(guid) => self.main_instances.get_mut(guid),
            GroupKey::Partition(key) => self.partitioned_instances.get_mut(key),
        }
    }

    /// Mesh of `actor` named `name`. The cache is refreshed once on a miss
    /// since actors may gain meshes after they were first seen.
    fn find_actor_mesh(&mut self, world: &W, actor: W::ActorId, name: &str) -> Option<W::MeshId> {
        let named = |meshes: &[W::MeshId]| {
            meshes
                .iter()
                .copied()
                .find(|&mesh| world.mesh(mesh).is_some_and(|instances| instances.name() == name))
        };

        if let Some(found) = self.mesh_cache.get(&actor).and_then(|meshes| named(meshes.as_slice())) {
            return Some(found);
        }

        let meshes = world.actor_meshes(actor);
        let found = named(meshes.as_slice());
        self.mesh_cache.insert(actor, meshes);
        found
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Export every removed instance, groups in registry order.
    pub fn persistent_data(&self) -> PersistentInstances {
        let main_instances = self
            .mains
            .iter()
            .filter_map(|guid| {
                self.main_instances.get(guid).map(|instances| MainInstances {
                    guid: *guid,
                    instances: instances.clone(),
                })
            })
            .collect();
        let partitioned_instances = self
            .partitions
            .iter()
            .filter_map(|key| {
                self.partitioned_instances
                    .get(key)
                    .map(|instances| PartitionedInstances {
                        partition: *key,
                        instances: instances.clone(),
                    })
            })
            .collect();

        PersistentInstances {
            mains: self.mains.clone(),
            partitions: self.partitions.clone(),
            main_instances,
            partitioned_instances,
            ..Default::default()
        }
    }

    /// Replace all state with `snapshot` and make the world match it.
    ///
    /// Every currently removed instance is restored first, then the
    /// snapshot's removals are applied to loaded actors. Stored indices are
    /// original indices and are converted to current slots per mesh.
    pub fn set_persistent_data(&mut self, world: &mut W, snapshot: PersistentInstances) -> ReconcileSummary {
        self.prune_stale(world);

        // Back to a "nothing removed" baseline
        let previous_mains = std::mem::take(&mut self.main_instances);
        for (guid, records) in previous_mains {
            if let Some(actor) = world.find_spawner(guid) {
                self.restore_all(world, actor, &records);
            }
        }
        let previous_partitions = std::mem::take(&mut self.partitioned_instances);
        for (key, records) in previous_partitions {
            if let Some(actor) = world.find_partition(key) {
                self.restore_all(world, actor, &records);
            }
        }

        self.mains = snapshot.mains;
        self.partitions = snapshot.partitions;
        for group in snapshot.main_instances {
            self.main_index(group.guid);
            self.main_instances.insert(group.guid, group.instances);
        }
        for group in snapshot.partitioned_instances {
            self.partition_index(group.partition);
            self.partitioned_instances.insert(group.partition, group.instances);
        }

        let groups: Vec<GroupKey> = self
            .mains
            .iter()
            .map(|guid| GroupKey::Main(*guid))
            .chain(self.partitions.iter().map(|key| GroupKey::Partition(*key)))
            .collect();

        let mut summary = ReconcileSummary::default();
        for group in groups {
            let records = self.records(&group).to_vec();
            if records.is_empty() {
                continue;
            }
            let Some(actor) = self.group_actor(world, &group) else {
                summary.deferred += 1;
                continue;
            };

            if self.apply_state_to_actor(world, actor, &records, true) {
                summary.applied += 1;
            } else {
                warn!("Failed to apply {} removed instances to {:?}", records.len(), group);
                summary.failed.push(group);
            }
        }

        self.applied_partitions = world.loaded_partitions().into_iter().collect();
        info!(
            "Applied snapshot: {} removed instances, {} groups applied, {} deferred, {} failed",
            self.removed_count(),
            summary.applied,
            summary.deferred,
            summary.failed.len()
        );
        summary
    }

    fn restore_all(&mut self, world: &mut W, actor: W::ActorId, records: &[InstanceRecord]) {
        for record in records {
            if !self.restore_record(world, actor, record) {
                warn!(
                    "Could not restore instance {} of '{}' on {:?}",
                    record.id, record.component_name, actor
                );
            }
        }
    }

    /// Remove the instances listed in `records` from `actor`.
    ///
    /// With `convert_to_current` the record ids are original indices and go
    /// through the tracker; otherwise the actor's content is fresh and ids
    /// are used as slots directly. Returns `false` if anything was skipped.
    fn apply_state_to_actor(
        &mut self,
        world: &mut W,
        actor: W::ActorId,
        records: &[InstanceRecord],
        convert_to_current: bool,
    ) -> bool {
        let mut by_component: BTreeMap<&str, Vec<i32>> = BTreeMap::new();
        for record in records {
            by_component
                .entry(record.component_name.as_str())
                .or_default()
                .push(record.id);
        }

        let mut success = true;
        for (name, ids) in by_component {
            let Some(mesh) = self.find_actor_mesh(world, actor, name) else {
                warn!("Mesh '{}' not found on {:?}, {} removals skipped", name, actor, ids.len());
                success = false;
                continue;
            };
            let Some(instance_count) = world.mesh(mesh).map(|instances| instances.instance_count()) else {
                success = false;
                continue;
            };

            let reverse = if convert_to_current {
                self.tracker.reverse_mapping(mesh)
            } else {
                None
            };

            let mut slots: Vec<usize> = Vec::with_capacity(ids.len());
            for id in &ids {
                let Ok(original) = usize::try_from(*id) else {
                    success = false;
                    continue;
                };
                let slot = match &reverse {
                    Some(reverse) => reverse.get(original).copied().flatten(),
                    None => Some(original),
                };
                match slot {
                    Some(slot) if slot < instance_count => slots.push(slot),
                    _ => success = false,
                }
            }

            slots.sort_unstable_by(|a, b| b.cmp(a));
            slots.dedup();

            self.tracker.ensure_initialized(mesh, instance_count);
            if slots.len() != ids.len() {
                warn!(
                    "Mesh '{}' on {:?}: {} of {} removals could not be matched",
                    name,
                    actor,
                    ids.len() - slots.len(),
                    ids.len()
                );
                success = false;
            }

            match world.mesh_mut(mesh).and_then(|instances| instances.remove_instances(&slots)) {
                Some(relocations) => self.tracker.on_relocated(mesh, &relocations),
                None => {
                    warn!("Renderer refused {} removals on mesh '{}'", slots.len(), name);
                    success = false;
                }
            }
        }
        success
    }

    // ========================================================================
    // Streaming
    // ========================================================================

    /// A partition actor streamed in: apply its stored removals to the fresh
    /// content. Applied once per load.
    pub fn on_partition_loaded(&mut self, world: &mut W, actor: W::ActorId) -> bool {
        let Some(ActorRole::Partition(key)) = world.actor_role(actor) else {
            return false;
        };
        if !self.applied_partitions.insert(actor) {
            debug!("Partition {:?} already applied", key.grid_coord);
            return true;
        }

        // Fresh content, slots are original indices again
        self.mesh_cache.remove(&actor);
        for mesh in world.actor_meshes(actor) {
            self.tracker.forget(mesh);
        }

        let records = self
            .partitioned_instances
            .get(&key)
            .cloned()
            .unwrap_or_default();
        if records.is_empty() {
            return true;
        }

        let applied = self.apply_state_to_actor(world, actor, &records, false);
        if applied {
            debug!(
                "Applied {} removed instances to partition {:?} (grid size {})",
                records.len(),
                key.grid_coord,
                key.grid_size
            );
        } else {
            warn!(
                "Failed to apply some of {} removed instances to partition {:?} (grid size {})",
                records.len(),
                key.grid_coord,
                key.grid_size
            );
        }
        applied
    }

    /// A partition actor is about to stream out. Its records stay, keyed by
    /// grid cell; the mesh cache and mappings go with the content.
    pub fn on_partition_unloaded(&mut self, world: &W, actor: W::ActorId) {
        let meshes = self
            .mesh_cache
            .remove(&actor)
            .unwrap_or_else(|| world.actor_meshes(actor));
        for mesh in meshes {
            self.tracker.forget(mesh);
        }
        self.applied_partitions.remove(&actor);
    }

    /// Drop mappings and cache entries of meshes and actors that no longer
    /// exist, such as despawned or regenerated spawners. Records are kept.
    /// Returns how many mappings were dropped.
    pub fn prune_stale(&mut self, world: &W) -> usize {
        let before = self.tracker.tracked_count();
        self.tracker.retain(|mesh| world.mesh(mesh).is_some());
        self.mesh_cache
            .retain(|actor, _| world.actor_role(*actor).is_some());
        self.applied_partitions
            .retain(|actor| world.actor_role(*actor).is_some());

        let dropped = before - self.tracker.tracked_count();
        if dropped > 0 {
            debug!("Pruned {} stale instance mappings", dropped);
        }
        dropped
    }

    /// Compaction the renderer did on its own.
    pub fn on_instances_relocated(&mut self, mesh: W::MeshId, relocations: &[InstanceRelocation]) {
        self.tracker.on_relocated(mesh, relocations);
    }
}
