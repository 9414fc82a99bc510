//! Provenance tags stored in per-instance custom data.
//!
//! Each rendered instance carries `TAG_FLOATS` floats identifying the spawn
//! candidate that produced it. The integers are stored offset by one and
//! reinterpreted as float bits, so a zero-filled buffer (fresh instance, no
//! tag written) reads back as [`TagEntry::NONE`].

use serde::{Deserialize, Serialize};

use crate::runtime::InstancedMesh;
use crate::spawn_preset::SpawnPreset;

/// Custom-data floats reserved per instance for the tag.
pub const TAG_FLOATS: usize = 2;

/// (set index, item index) into a [`SpawnPreset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagEntry {
    pub set_index: i32,
    pub item_index: i32,
}

impl Default for TagEntry {
    fn default() -> Self {
        Self::NONE
    }
}

impl TagEntry {
    /// No provenance known. Not an index into set 0.
    pub const NONE: TagEntry = TagEntry {
        set_index: -1,
        item_index: -1,
    };

    pub const fn new(set_index: i32, item_index: i32) -> Self {
        Self {
            set_index,
            item_index,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.set_index >= 0 && self.item_index >= 0
    }

    pub fn encode(&self) -> [f32; TAG_FLOATS] {
        [
            f32::from_bits(self.set_index.wrapping_add(1) as u32),
            f32::from_bits(self.item_index.wrapping_add(1) as u32),
        ]
    }

    /// Empty or undersized payloads decode to `NONE`.
    pub fn decode(data: &[f32]) -> TagEntry {
        if data.len() < TAG_FLOATS {
            return TagEntry::NONE;
        }
        TagEntry {
            set_index: (data[0].to_bits() as i32).wrapping_sub(1),
            item_index: (data[1].to_bits() as i32).wrapping_sub(1),
        }
    }
}

/// Tag of a live instance.
pub fn read_tag<M: InstancedMesh + ?Sized>(mesh: &M, slot: usize) -> TagEntry {
    TagEntry::decode(mesh.custom_data(slot))
}

/// Stamp a tag onto a live instance. Meshes without custom data ignore it.
pub fn write_tag<M: InstancedMesh + ?Sized>(mesh: &mut M, slot: usize, tag: TagEntry) -> bool {
    mesh.set_custom_data(slot, &tag.encode())
}

/// Custom data for a batch of instances, one tag per instance.
///
/// Only candidates with user data need tags; `None` means no instance of the
/// batch came from such a candidate and the batch can be rendered without a
/// custom-data channel.
pub fn pack_custom_data(preset: &SpawnPreset, tags: &[TagEntry]) -> Option<Vec<f32>> {
    if !tags.iter().any(|&tag| preset.user_data(tag).is_some()) {
        return None;
    }

    let mut data = Vec::with_capacity(tags.len() * TAG_FLOATS);
    for tag in tags {
        data.extend_from_slice(&tag.encode());
    }
    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawn_preset::{InstanceUserData, SpawnCandidate, SpawnSet};

    #[test]
    fn test_encode_decode() {
        let tag = TagEntry::new(3, 17);
        assert_eq!(TagEntry::decode(&tag.encode()), tag);

        // Large indices survive float reinterpretation bit for bit
        let wide = TagEntry::new(1_000_000, 0);
        assert_eq!(TagEntry::decode(&wide.encode()), wide);
    }

    #[test]
    fn test_zero_payload_is_none() {
        assert_eq!(TagEntry::decode(&[0.0, 0.0]), TagEntry::NONE);
        assert_eq!(TagEntry::decode(&[0.0, 0.0, 0.0, 0.0]), TagEntry::NONE);
        assert!(!TagEntry::decode(&[0.0, 0.0]).is_valid());

        // NONE encodes to the zero payload
        assert_eq!(TagEntry::NONE.encode(), [0.0, 0.0]);
    }

    #[test]
    fn test_undersized_payload_is_none() {
        assert_eq!(TagEntry::decode(&[]), TagEntry::NONE);
        let tag = TagEntry::new(1, 1).encode();
        assert_eq!(TagEntry::decode(&tag[..1]), TagEntry::NONE);
    }

    #[test]
    fn test_set_zero_item_zero_is_distinct_from_none() {
        let first = TagEntry::new(0, 0);
        assert!(first.is_valid());
        assert_ne!(first.encode(), TagEntry::NONE.encode());
        assert_eq!(TagEntry::decode(&first.encode()), first);
    }

    #[test]
    fn test_pack_only_when_user_data() {
        let preset = SpawnPreset {
            sets: vec![SpawnSet {
                name: "Forest".to_string(),
                candidates: vec![
                    SpawnCandidate::new("pine", 1),
                    SpawnCandidate::new("oak", 1)
                        .with_user_data(InstanceUserData::Tag("acorns".to_string())),
                ],
            }],
        };
        let pine = TagEntry::new(0, 0);
        let oak = TagEntry::new(0, 1);

        assert!(pack_custom_data(&preset, &[pine, pine]).is_none());
        assert!(pack_custom_data(&preset, &[]).is_none());
        assert!(pack_custom_data(&preset, &[TagEntry::NONE]).is_none());

        let data = pack_custom_data(&preset, &[oak, pine, oak]).unwrap();
        assert_eq!(data.len(), 3 * TAG_FLOATS);
        let decoded: Vec<TagEntry> = data.chunks(TAG_FLOATS).map(TagEntry::decode).collect();
        assert_eq!(decoded, vec![oak, pine, oak]);
    }
}
