//! Durable identity types: groups, handles and removed-instance records.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tags::TagEntry;

/// "No index" sentinel used by handles and records.
pub const INDEX_NONE: i32 = -1;

/// Integer cell of a spatial partition grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl GridCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Identity of a partition group: a cell of a grid of a given cell size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub grid_coord: GridCoord,
    pub grid_size: u32,
}

impl PartitionKey {
    pub const fn new(grid_coord: GridCoord, grid_size: u32) -> Self {
        Self {
            grid_coord,
            grid_size,
        }
    }
}

/// Unit of co-located storage for removed-instance records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// Non-partitioned spawner, by its persistent GUID
    Main(Uuid),
    Partition(PartitionKey),
}

/// Position of a group inside the controller's registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSlot {
    Main(usize),
    Partition(usize),
}

/// Durable reference to a (possibly removed) instance.
///
/// `group_id` is negative for main groups (`-(index + 1)`), positive for
/// partition groups (`index + 1`) and zero when invalid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceHandle {
    pub group_id: i16,
    pub component_name: String,
    pub instance_id: i32,
}

impl Default for InstanceHandle {
    fn default() -> Self {
        Self {
            group_id: 0,
            component_name: String::new(),
            instance_id: INDEX_NONE,
        }
    }
}

impl InstanceHandle {
    /// Handle for a record in a group. `None` when the group position does
    /// not fit in the 16-bit id.
    pub fn new(slot: GroupSlot, component_name: impl Into<String>, instance_id: i32) -> Option<Self> {
        let group_id = match slot {
            GroupSlot::Main(index) => -(i32::try_from(index).ok()?.checked_add(1)?),
            GroupSlot::Partition(index) => i32::try_from(index).ok()?.checked_add(1)?,
        };
        let group_id = i16::try_from(group_id).ok()?;
        Some(Self {
            group_id,
            component_name: component_name.into(),
            instance_id,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.group_id != 0 && !self.component_name.is_empty() && self.instance_id != INDEX_NONE
    }

    pub fn group_slot(&self) -> Option<GroupSlot> {
        let id = self.group_id as i32;
        match id {
            0 => None,
            id if id < 0 => Some(GroupSlot::Main((-id - 1) as usize)),
            id => Some(GroupSlot::Partition((id - 1) as usize)),
        }
    }
}

/// Serializable world transform. Stored as plain arrays so the snapshot
/// format does not depend on engine math types.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavedTransform {
    pub translation: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl From<Transform> for SavedTransform {
    fn from(transform: Transform) -> Self {
        Self {
            translation: transform.translation.to_array(),
            rotation: transform.rotation.to_array(),
            scale: transform.scale.to_array(),
        }
    }
}

impl From<SavedTransform> for Transform {
    fn from(saved: SavedTransform) -> Self {
        Transform {
            translation: Vec3::from_array(saved.translation),
            rotation: Quat::from_array(saved.rotation),
            scale: Vec3::from_array(saved.scale),
        }
    }
}

/// A removed instance awaiting restoration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Stable original index inside the component
    pub id: i32,
    pub transform: SavedTransform,
    pub component_name: String,
    pub set_index: i32,
    pub item_index: i32,
}

impl InstanceRecord {
    pub fn matches(&self, handle: &InstanceHandle) -> bool {
        self.id == handle.instance_id && self.component_name == handle.component_name
    }

    pub fn tag(&self) -> TagEntry {
        TagEntry::new(self.set_index, self.item_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handle_is_invalid() {
        let handle = InstanceHandle::default();
        assert!(!handle.is_valid());
        assert_eq!(handle.group_slot(), None);
    }

    #[test]
    fn test_group_id_encoding() {
        let main = InstanceHandle::new(GroupSlot::Main(0), "Rocks", 3).unwrap();
        assert_eq!(main.group_id, -1);
        assert_eq!(main.group_slot(), Some(GroupSlot::Main(0)));

        let partition = InstanceHandle::new(GroupSlot::Partition(4), "Rocks", 3).unwrap();
        assert_eq!(partition.group_id, 5);
        assert_eq!(partition.group_slot(), Some(GroupSlot::Partition(4)));

        // Limits of the 16-bit id
        let last_main = InstanceHandle::new(GroupSlot::Main(32767), "Rocks", 0).unwrap();
        assert_eq!(last_main.group_id, i16::MIN);
        assert_eq!(last_main.group_slot(), Some(GroupSlot::Main(32767)));
        assert!(InstanceHandle::new(GroupSlot::Main(32768), "Rocks", 0).is_none());
        assert!(InstanceHandle::new(GroupSlot::Partition(32767), "Rocks", 0).is_none());
    }

    #[test]
    fn test_validity_needs_every_field() {
        let mut handle = InstanceHandle::new(GroupSlot::Partition(0), "Trees", 0).unwrap();
        assert!(handle.is_valid());

        handle.component_name.clear();
        assert!(!handle.is_valid());

        handle.component_name = "Trees".to_string();
        handle.instance_id = INDEX_NONE;
        assert!(!handle.is_valid());
    }

    #[test]
    fn test_saved_transform_is_exact() {
        let transform = Transform {
            translation: Vec3::new(1.25, -7.5, 1e-7),
            rotation: Quat::from_rotation_y(0.3),
            scale: Vec3::new(0.8, 0.8, 0.8),
        };
        let back: Transform = SavedTransform::from(transform).into();
        assert_eq!(back, transform);
    }

    #[test]
    fn test_record_matches_handle() {
        let record = InstanceRecord {
            id: 2,
            transform: Transform::IDENTITY.into(),
            component_name: "Bushes".to_string(),
            set_index: 0,
            item_index: 1,
        };
        let handle = InstanceHandle::new(GroupSlot::Main(0), "Bushes", 2).unwrap();
        assert!(record.matches(&handle));
        assert!(!record.matches(&InstanceHandle { instance_id: 3, ..handle.clone() }));
        assert_eq!(record.tag(), TagEntry::new(0, 1));
    }
}
