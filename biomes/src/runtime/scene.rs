//! In-memory instance world.
//!
//! Hosts without their own renderer integration (tools, headless servers,
//! tests) can keep generated content here. Removal compacts by moving the
//! last instance into the hole, the way GPU instance buffers usually do,
//! and reports each move as a relocation.

use bevy::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::handle::PartitionKey;
use super::world::{ActorRole, InstanceRelocation, InstanceWorld, InstancedMesh};
use crate::mesh_selection::MeshBatch;
use crate::spawn_preset::SpawnPreset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneMeshId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneActorId(pub u32);

#[derive(Debug, Clone)]
pub struct InstanceBuffer {
    name: String,
    transforms: Vec<Transform>,
    /// Floats per instance
    custom_data_floats: usize,
    custom_data: Vec<f32>,
    /// Mid-upload buffers refuse removals
    frozen: bool,
}

impl InstanceBuffer {
    pub fn new(name: impl Into<String>, custom_data_floats: usize) -> Self {
        Self {
            name: name.into(),
            transforms: Vec::new(),
            custom_data_floats,
            custom_data: Vec::new(),
            frozen: false,
        }
    }

    pub fn with_transforms(
        name: impl Into<String>,
        custom_data_floats: usize,
        transforms: Vec<Transform>,
    ) -> Self {
        let custom_data = vec![0.0; transforms.len() * custom_data_floats];
        Self {
            name: name.into(),
            transforms,
            custom_data_floats,
            custom_data,
            frozen: false,
        }
    }

    /// Buffer for a generated batch, tags included.
    pub fn from_batch(batch: &MeshBatch) -> Self {
        let mut buffer = Self::with_transforms(
            batch.mesh.clone(),
            batch.custom_data_floats(),
            batch.transforms.clone(),
        );
        if let Some(data) = &batch.custom_data {
            if data.len() == buffer.custom_data.len() {
                buffer.custom_data.copy_from_slice(data);
            }
        }
        buffer
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    fn data_range(&self, slot: usize) -> std::ops::Range<usize> {
        let start = slot * self.custom_data_floats;
        start..start + self.custom_data_floats
    }
}

impl InstancedMesh for InstanceBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn instance_count(&self) -> usize {
        self.transforms.len()
    }

    fn instance_transform(&self, slot: usize) -> Option<Transform> {
        self.transforms.get(slot).copied()
    }

    fn add_instance(&mut self, transform: Transform) -> usize {
        self.transforms.push(transform);
        self.custom_data
            .extend(std::iter::repeat(0.0).take(self.custom_data_floats));
        self.transforms.len() - 1
    }

    fn remove_instances(&mut self, slots: &[usize]) -> Option<Vec<InstanceRelocation>> {
        let descending = slots.windows(2).all(|pair| pair[0] > pair[1]);
        if self.frozen || !descending || slots.iter().any(|&slot| slot >= self.transforms.len()) {
            return None;
        }

        let mut relocations = Vec::new();
        for &slot in slots {
            let last = self.transforms.len() - 1;
            self.transforms.swap_remove(slot);

            if self.custom_data_floats > 0 {
                if slot != last {
                    let moved = self.data_range(last);
                    self.custom_data.copy_within(moved, slot * self.custom_data_floats);
                }
                self.custom_data.truncate(last * self.custom_data_floats);
            }

            if slot != last {
                relocations.push(InstanceRelocation {
                    old_slot: last,
                    new_slot: slot,
                });
            }
        }
        Some(relocations)
    }

    fn custom_data(&self, slot: usize) -> &[f32] {
        if slot >= self.transforms.len() {
            return &[];
        }
        &self.custom_data[self.data_range(slot)]
    }

    fn set_custom_data(&mut self, slot: usize, data: &[f32]) -> bool {
        if slot >= self.transforms.len() || data.len() > self.custom_data_floats {
            return false;
        }
        let start = slot * self.custom_data_floats;
        self.custom_data[start..start + data.len()].copy_from_slice(data);
        true
    }
}

#[derive(Debug)]
struct SceneActor {
    role: ActorRole,
    meshes: Vec<SceneMeshId>,
    preset: Option<Arc<SpawnPreset>>,
}

#[derive(Debug)]
struct SceneMesh {
    owner: SceneActorId,
    buffer: InstanceBuffer,
}

/// Actors and their instance buffers.
#[derive(Resource, Default, Debug)]
pub struct SceneWorld {
    actors: HashMap<SceneActorId, SceneActor>,
    meshes: HashMap<SceneMeshId, SceneMesh>,
    next_id: u32,
}

impl SceneWorld {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn spawn_actor(&mut self, role: ActorRole, preset: Option<Arc<SpawnPreset>>) -> SceneActorId {
        let id = SceneActorId(self.next_id());
        self.actors.insert(
            id,
            SceneActor {
                role,
                meshes: Vec::new(),
                preset,
            },
        );
        id
    }

    pub fn add_mesh(&mut self, actor: SceneActorId, buffer: InstanceBuffer) -> Option<SceneMeshId> {
        if !self.actors.contains_key(&actor) {
            return None;
        }
        let id = SceneMeshId(self.next_id());
        self.meshes.insert(id, SceneMesh { owner: actor, buffer });
        if let Some(entry) = self.actors.get_mut(&actor) {
            entry.meshes.push(id);
        }
        Some(id)
    }

    /// Unload an actor and everything it renders.
    pub fn despawn_actor(&mut self, actor: SceneActorId) -> bool {
        let Some(entry) = self.actors.remove(&actor) else {
            return false;
        };
        for mesh in entry.meshes {
            self.meshes.remove(&mesh);
        }
        true
    }

    /// Mesh of an actor by component name.
    pub fn find_mesh(&self, actor: SceneActorId, name: &str) -> Option<SceneMeshId> {
        let entry = self.actors.get(&actor)?;
        entry
            .meshes
            .iter()
            .copied()
            .find(|id| self.meshes.get(id).is_some_and(|mesh| mesh.buffer.name() == name))
    }

    pub fn instance_total(&self) -> usize {
        self.meshes.values().map(|mesh| mesh.buffer.instance_count()).sum()
    }
}

impl InstanceWorld for SceneWorld {
    type MeshId = SceneMeshId;
    type ActorId = SceneActorId;
    type Mesh = InstanceBuffer;

    fn mesh(&self, mesh: SceneMeshId) -> Option<&InstanceBuffer> {
        self.meshes.get(&mesh).map(|entry| &entry.buffer)
    }

    fn mesh_mut(&mut self, mesh: SceneMeshId) -> Option<&mut InstanceBuffer> {
        self.meshes.get_mut(&mesh).map(|entry| &mut entry.buffer)
    }

    fn mesh_owner(&self, mesh: SceneMeshId) -> Option<SceneActorId> {
        self.meshes.get(&mesh).map(|entry| entry.owner)
    }

    fn actor_role(&self, actor: SceneActorId) -> Option<ActorRole> {
        self.actors.get(&actor).map(|entry| entry.role)
    }

    fn actor_meshes(&self, actor: SceneActorId) -> Vec<SceneMeshId> {
        self.actors
            .get(&actor)
            .map(|entry| entry.meshes.clone())
            .unwrap_or_default()
    }

    fn find_spawner(&self, guid: Uuid) -> Option<SceneActorId> {
        self.actors
            .iter()
            .find(|(_, entry)| entry.role == ActorRole::Spawner(guid))
            .map(|(id, _)| *id)
    }

    fn find_partition(&self, key: PartitionKey) -> Option<SceneActorId> {
        self.actors
            .iter()
            .find(|(_, entry)| entry.role == ActorRole::Partition(key))
            .map(|(id, _)| *id)
    }

    fn loaded_partitions(&self) -> Vec<SceneActorId> {
        let mut partitions: Vec<SceneActorId> = self
            .actors
            .iter()
            .filter(|(_, entry)| matches!(entry.role, ActorRole::Partition(_)))
            .map(|(id, _)| *id)
            .collect();
        partitions.sort();
        partitions
    }

    fn spawn_preset(&self, actor: SceneActorId) -> Option<&SpawnPreset> {
        self.actors.get(&actor)?.preset.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::handle::GridCoord;
    use crate::tags::{read_tag, write_tag, TagEntry, TAG_FLOATS};

    fn at(x: f32) -> Transform {
        Transform::from_xyz(x, 0.0, 0.0)
    }

    fn buffer(count: usize) -> InstanceBuffer {
        InstanceBuffer::with_transforms("Rocks", TAG_FLOATS, (0..count).map(|i| at(i as f32)).collect())
    }

    #[test]
    fn test_swap_remove_reports_relocation() {
        let mut buffer = buffer(5);
        let relocations = buffer.remove_instances(&[2]).unwrap();

        assert_eq!(relocations, vec![InstanceRelocation { old_slot: 4, new_slot: 2 }]);
        assert_eq!(buffer.instance_count(), 4);
        assert_eq!(buffer.instance_transform(2), Some(at(4.0)));
    }

    #[test]
    fn test_removing_last_slot_moves_nothing() {
        let mut buffer = buffer(3);
        assert!(buffer.remove_instances(&[2]).unwrap().is_empty());
        assert_eq!(buffer.instance_count(), 2);
    }

    #[test]
    fn test_invalid_removal_changes_nothing() {
        let mut buffer = buffer(3);
        assert!(buffer.remove_instances(&[5]).is_none());
        // Ascending order is rejected
        assert!(buffer.remove_instances(&[0, 1]).is_none());
        assert_eq!(buffer.instance_count(), 3);

        buffer.set_frozen(true);
        assert!(buffer.remove_instances(&[0]).is_none());
        assert_eq!(buffer.instance_count(), 3);
    }

    #[test]
    fn test_custom_data_follows_instances() {
        let mut buffer = buffer(4);
        for slot in 0..4 {
            assert!(write_tag(&mut buffer, slot, TagEntry::new(0, slot as i32)));
        }

        buffer.remove_instances(&[1]).unwrap();
        // Instance from slot 3 now lives in slot 1, with its tag
        assert_eq!(read_tag(&buffer, 1), TagEntry::new(0, 3));
        assert_eq!(read_tag(&buffer, 2), TagEntry::new(0, 2));

        // New instances start untagged
        let slot = buffer.add_instance(at(9.0));
        assert_eq!(read_tag(&buffer, slot), TagEntry::NONE);
    }

    #[test]
    fn test_mesh_without_custom_data() {
        let mut buffer = InstanceBuffer::with_transforms("Grass", 0, vec![at(0.0)]);
        assert!(buffer.custom_data(0).is_empty());
        assert!(!write_tag(&mut buffer, 0, TagEntry::new(1, 1)));
        assert_eq!(read_tag(&buffer, 0), TagEntry::NONE);
    }

    #[test]
    fn test_world_lookups() {
        let mut world = SceneWorld::new();
        let guid = Uuid::new_v4();
        let key = PartitionKey::new(GridCoord::new(1, 0, 0), 100);

        let spawner = world.spawn_actor(ActorRole::Spawner(guid), None);
        let partition = world.spawn_actor(ActorRole::Partition(key), None);
        let mesh = world.add_mesh(partition, buffer(2)).unwrap();

        assert_eq!(world.find_spawner(guid), Some(spawner));
        assert_eq!(world.find_partition(key), Some(partition));
        assert_eq!(world.loaded_partitions(), vec![partition]);
        assert_eq!(world.mesh_owner(mesh), Some(partition));
        assert_eq!(world.find_mesh(partition, "Rocks"), Some(mesh));

        assert!(world.despawn_actor(partition));
        assert!(world.mesh(mesh).is_none());
        assert!(world.find_partition(key).is_none());
    }
}
