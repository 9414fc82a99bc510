//! Host integration seams: the instanced renderer and the world that owns it.
//!
//! The controller never reaches into engine storage; it only talks to these
//! traits. [`super::scene`] has an in-memory implementation.

use bevy::prelude::*;
use std::fmt::Debug;
use std::hash::Hash;
use uuid::Uuid;

use super::handle::PartitionKey;
use crate::spawn_preset::{InstanceUserData, SpawnCandidate, SpawnPreset};
use crate::tags::{read_tag, TagEntry};

/// The renderer moved the instance at `old_slot` to `new_slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceRelocation {
    pub old_slot: usize,
    pub new_slot: usize,
}

/// What a generation actor is to the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    /// Non-partitioned spawner, identified by a GUID that survives reloads
    Spawner(Uuid),
    /// Streamed actor covering one grid cell
    Partition(PartitionKey),
}

/// One instanced-mesh component.
pub trait InstancedMesh {
    /// Name of the component, unique within its owning actor.
    fn name(&self) -> &str;

    fn instance_count(&self) -> usize;

    fn is_valid_instance(&self, slot: usize) -> bool {
        slot < self.instance_count()
    }

    /// World-space transform of a live instance.
    fn instance_transform(&self, slot: usize) -> Option<Transform>;

    /// Append an instance, returning its slot.
    fn add_instance(&mut self, transform: Transform) -> usize;

    /// Remove instances. `slots` is sorted descending with no duplicates.
    ///
    /// Returns the relocations the compaction caused, in order, or `None`
    /// (and removes nothing) when a slot is invalid.
    fn remove_instances(&mut self, slots: &[usize]) -> Option<Vec<InstanceRelocation>>;

    /// Per-instance custom data. Empty when the mesh has none.
    fn custom_data(&self, slot: usize) -> &[f32];

    /// Overwrite the leading custom-data floats of an instance. Returns
    /// `false` when the mesh has no room for `data`.
    fn set_custom_data(&mut self, slot: usize, data: &[f32]) -> bool;
}

/// The world the controller reconciles against.
pub trait InstanceWorld: 'static {
    type MeshId: Copy + Eq + Hash + Debug + Send + Sync + 'static;
    type ActorId: Copy + Eq + Hash + Debug + Send + Sync + 'static;
    type Mesh: InstancedMesh;

    fn mesh(&self, mesh: Self::MeshId) -> Option<&Self::Mesh>;

    fn mesh_mut(&mut self, mesh: Self::MeshId) -> Option<&mut Self::Mesh>;

    /// Actor owning a mesh. Every live mesh has one.
    fn mesh_owner(&self, mesh: Self::MeshId) -> Option<Self::ActorId>;

    /// `None` when the actor has no generation component.
    fn actor_role(&self, actor: Self::ActorId) -> Option<ActorRole>;

    fn actor_meshes(&self, actor: Self::ActorId) -> Vec<Self::MeshId>;

    /// Loaded spawner with this GUID.
    fn find_spawner(&self, guid: Uuid) -> Option<Self::ActorId>;

    /// Loaded partition actor covering this cell.
    fn find_partition(&self, key: PartitionKey) -> Option<Self::ActorId>;

    fn loaded_partitions(&self) -> Vec<Self::ActorId>;

    /// Preset the actor's content was generated from. Partition actors
    /// report the preset of the spawner that produced them.
    fn spawn_preset(&self, actor: Self::ActorId) -> Option<&SpawnPreset>;
}

/// Provenance tag of a live instance.
pub fn live_tag<W: InstanceWorld>(world: &W, mesh: W::MeshId, slot: usize) -> TagEntry {
    match world.mesh(mesh) {
        Some(instances) if instances.is_valid_instance(slot) => read_tag(instances, slot),
        _ => TagEntry::NONE,
    }
}

/// Spawn candidate that produced a live instance.
pub fn live_spawn_candidate<W: InstanceWorld>(
    world: &W,
    mesh: W::MeshId,
    slot: usize,
) -> Option<&SpawnCandidate> {
    let tag = live_tag(world, mesh, slot);
    if !tag.is_valid() {
        return None;
    }
    let owner = world.mesh_owner(mesh)?;
    world.spawn_preset(owner)?.candidate(tag)
}

/// User data of the candidate that produced a live instance.
pub fn live_user_data<W: InstanceWorld>(
    world: &W,
    mesh: W::MeshId,
    slot: usize,
) -> Option<&InstanceUserData> {
    live_spawn_candidate(world, mesh, slot)?.user_data.as_ref()
}
