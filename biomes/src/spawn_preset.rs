//! Spawn presets: named sets of weighted meshes.
//!
//! A preset is a read-only RON asset. Layers refer to sets by name; rendered
//! instances refer back to a candidate through a [`TagEntry`]
//! (set index, item index), so set and candidate order is part of the
//! asset's contract once instances have been saved.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::random::Weighted;
use crate::tags::TagEntry;

/// Payload a game attaches to a spawn candidate (loot tables, harvest
/// results, interaction hints). Never stored on the instance itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceUserData {
    Tag(String),
    Properties(BTreeMap<String, String>),
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnCandidate {
    /// Asset path of the mesh
    pub mesh: String,
    #[serde(default)]
    pub user_data: Option<InstanceUserData>,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl SpawnCandidate {
    pub fn new(mesh: impl Into<String>, weight: u32) -> Self {
        Self {
            mesh: mesh.into(),
            user_data: None,
            weight,
        }
    }

    pub fn with_user_data(mut self, user_data: InstanceUserData) -> Self {
        self.user_data = Some(user_data);
        self
    }
}

impl Weighted for SpawnCandidate {
    fn weight(&self) -> i32 {
        i32::try_from(self.weight).unwrap_or(i32::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnSet {
    pub name: String,
    #[serde(default)]
    pub candidates: Vec<SpawnCandidate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpawnPreset {
    #[serde(default)]
    pub sets: Vec<SpawnSet>,
}

impl SpawnPreset {
    pub fn from_ron_str(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    /// Set by name, with its index.
    pub fn find_set(&self, name: &str) -> Option<(usize, &SpawnSet)> {
        self.sets.iter().enumerate().find(|(_, set)| set.name == name)
    }

    /// First candidate using `mesh`, scanning sets then items in order.
    pub fn find_candidate_by_mesh(&self, mesh: &str) -> Option<TagEntry> {
        self.sets.iter().enumerate().find_map(|(set_index, set)| {
            set.candidates
                .iter()
                .position(|candidate| candidate.mesh == mesh)
                .map(|item_index| TagEntry::new(set_index as i32, item_index as i32))
        })
    }

    pub fn candidate(&self, tag: TagEntry) -> Option<&SpawnCandidate> {
        if !tag.is_valid() {
            return None;
        }
        self.sets
            .get(tag.set_index as usize)?
            .candidates
            .get(tag.item_index as usize)
    }

    pub fn user_data(&self, tag: TagEntry) -> Option<&InstanceUserData> {
        self.candidate(tag)?.user_data.as_ref()
    }

    /// Whether any candidate carries a payload (and instances need tags).
    pub fn has_user_data(&self) -> bool {
        self.sets
            .iter()
            .flat_map(|set| set.candidates.iter())
            .any(|candidate| candidate.user_data.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRESET: &str = r#"(
        sets: [
            (
                name: "Rocks",
                candidates: [
                    (mesh: "meshes/rock_a.glb", weight: 3),
                    (mesh: "meshes/rock_b.glb", user_data: Some(Tag("ore")), weight: 1),
                ],
            ),
            (
                name: "Trees",
                candidates: [
                    (mesh: "meshes/pine.glb", user_data: Some(Properties({"wood": "12"}))),
                    (mesh: "meshes/rock_b.glb"),
                ],
            ),
        ],
    )"#;

    #[test]
    fn test_parse_preset() {
        let preset = SpawnPreset::from_ron_str(PRESET).unwrap();
        assert_eq!(preset.sets.len(), 2);

        let (index, trees) = preset.find_set("Trees").unwrap();
        assert_eq!(index, 1);
        // Weight defaults to 1 when omitted
        assert_eq!(trees.candidates[0].weight, 1);
        assert!(preset.has_user_data());
        assert!(preset.find_set("Swamp").is_none());
    }

    #[test]
    fn test_reverse_lookup_takes_first_match() {
        let preset = SpawnPreset::from_ron_str(PRESET).unwrap();

        // rock_b appears in both sets, the first one wins
        let tag = preset.find_candidate_by_mesh("meshes/rock_b.glb").unwrap();
        assert_eq!(tag, TagEntry::new(0, 1));
        assert_eq!(
            preset.user_data(tag),
            Some(&InstanceUserData::Tag("ore".to_string()))
        );

        assert!(preset.find_candidate_by_mesh("meshes/missing.glb").is_none());
    }

    #[test]
    fn test_candidate_lookup_rejects_bad_tags() {
        let preset = SpawnPreset::from_ron_str(PRESET).unwrap();
        assert!(preset.candidate(TagEntry::NONE).is_none());
        assert!(preset.candidate(TagEntry::new(5, 0)).is_none());
        assert!(preset.candidate(TagEntry::new(0, 9)).is_none());
        assert_eq!(
            preset.candidate(TagEntry::new(1, 0)).map(|c| c.mesh.as_str()),
            Some("meshes/pine.glb")
        );
    }

    #[test]
    fn test_invalid_ron_is_an_error() {
        assert!(SpawnPreset::from_ron_str("(sets: [ (name: ").is_err());
    }
}
