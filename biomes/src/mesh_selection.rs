//! Mesh selection: weighted pick of a candidate per spawn point, then
//! batching into per-mesh instance lists ready for the renderer.

use bevy::prelude::*;
use rayon::prelude::*;

use crate::error::{BiomesError, Result};
use crate::point::GenerationPoint;
use crate::random::{combine_seed, seeded_rng, select_random_index, total_weight};
use crate::spawn_preset::SpawnPreset;
use crate::tags::{pack_custom_data, TagEntry, TAG_FLOATS};

#[derive(Debug, Clone, PartialEq)]
pub struct MeshAssignment {
    pub point_index: usize,
    pub mesh: String,
    pub tag: TagEntry,
}

/// Pick a mesh from `set_name` for every point.
///
/// An empty set name or an empty set selects nothing. A set that does not
/// exist, or whose weights sum to zero, is a configuration error.
pub fn select_meshes(
    points: &[GenerationPoint],
    preset: &SpawnPreset,
    set_name: &str,
    seed: i32,
) -> Result<Vec<MeshAssignment>> {
    if set_name.is_empty() {
        return Ok(Vec::new());
    }

    let Some((set_index, set)) = preset.find_set(set_name) else {
        error!("Spawn set '{}' not found", set_name);
        return Err(BiomesError::SetNotFound(set_name.to_string()));
    };

    if set.candidates.is_empty() {
        debug!("Spawn set '{}' is empty, nothing to select", set_name);
        return Ok(Vec::new());
    }

    let total = total_weight(&set.candidates);
    if total <= 0 {
        warn!("Spawn set '{}' has zero total weight", set_name);
        return Err(BiomesError::ZeroWeight(set_name.to_string()));
    }

    let assignments = points
        .par_iter()
        .enumerate()
        .filter_map(|(point_index, point)| {
            let mut rng = seeded_rng(combine_seed(seed, point.seed));
            let item_index = select_random_index(&set.candidates, &mut rng, Some(total))?;
            Some(MeshAssignment {
                point_index,
                mesh: set.candidates[item_index].mesh.clone(),
                tag: TagEntry::new(set_index as i32, item_index as i32),
            })
        })
        .collect();

    Ok(assignments)
}

/// Instances of one mesh, in point order.
#[derive(Debug, Clone)]
pub struct MeshBatch {
    pub mesh: String,
    pub transforms: Vec<Transform>,
    /// Provenance of each instance, parallel to `transforms`
    pub tags: Vec<TagEntry>,
    /// `TAG_FLOATS` per instance when any instance's candidate carries user data
    pub custom_data: Option<Vec<f32>>,
}

impl MeshBatch {
    pub fn custom_data_floats(&self) -> usize {
        if self.custom_data.is_some() {
            TAG_FLOATS
        } else {
            0
        }
    }
}

/// Group assignments by mesh, in order of first appearance.
///
/// A mesh used by several candidates still makes one batch; every instance
/// keeps the tag of the candidate that picked it.
pub fn build_batches(
    points: &[GenerationPoint],
    assignments: &[MeshAssignment],
    preset: &SpawnPreset,
) -> Vec<MeshBatch> {
    let mut batches: Vec<MeshBatch> = Vec::new();
    for assignment in assignments {
        let Some(point) = points.get(assignment.point_index) else {
            continue;
        };
        match batches.iter_mut().find(|batch| batch.mesh == assignment.mesh) {
            Some(batch) => {
                batch.transforms.push(point.transform);
                batch.tags.push(assignment.tag);
            }
            None => batches.push(MeshBatch {
                mesh: assignment.mesh.clone(),
                transforms: vec![point.transform],
                tags: vec![assignment.tag],
                custom_data: None,
            }),
        }
    }

    for batch in &mut batches {
        batch.custom_data = pack_custom_data(preset, &batch.tags);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawn_preset::{InstanceUserData, SpawnCandidate, SpawnSet};

    fn preset() -> SpawnPreset {
        SpawnPreset {
            sets: vec![
                SpawnSet {
                    name: "Rocks".to_string(),
                    candidates: vec![
                        SpawnCandidate::new("rock_small", 3),
                        SpawnCandidate::new("rock_big", 1)
                            .with_user_data(InstanceUserData::Tag("ore".to_string())),
                    ],
                },
                SpawnSet {
                    name: "Empty".to_string(),
                    candidates: Vec::new(),
                },
                SpawnSet {
                    name: "Weightless".to_string(),
                    candidates: vec![SpawnCandidate::new("ghost", 0)],
                },
            ],
        }
    }

    fn points(count: i32) -> Vec<GenerationPoint> {
        (0..count)
            .map(|i| GenerationPoint::new(Vec3::new(i as f32, 0.0, 0.0), i * 31))
            .collect()
    }

    #[test]
    fn test_every_point_gets_a_mesh() {
        let points = points(50);
        let assignments = select_meshes(&points, &preset(), "Rocks", 9).unwrap();
        assert_eq!(assignments.len(), 50);

        for (i, assignment) in assignments.iter().enumerate() {
            // Output keeps point order
            assert_eq!(assignment.point_index, i);
            assert_eq!(assignment.tag.set_index, 0);
        }
        assert!(assignments.iter().any(|a| a.mesh == "rock_small"));
    }

    #[test]
    fn test_selection_is_deterministic() {
        let points = points(20);
        let a = select_meshes(&points, &preset(), "Rocks", 4).unwrap();
        let b = select_meshes(&points, &preset(), "Rocks", 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_configuration_errors() {
        let points = points(5);
        assert!(matches!(
            select_meshes(&points, &preset(), "Trees", 0),
            Err(BiomesError::SetNotFound(name)) if name == "Trees"
        ));
        assert!(matches!(
            select_meshes(&points, &preset(), "Weightless", 0),
            Err(BiomesError::ZeroWeight(_))
        ));
    }

    #[test]
    fn test_empty_inputs_select_nothing() {
        let points = points(5);
        assert!(select_meshes(&points, &preset(), "", 0).unwrap().is_empty());
        assert!(select_meshes(&points, &preset(), "Empty", 0).unwrap().is_empty());
    }

    #[test]
    fn test_batches_tag_only_user_data_meshes() {
        let points = points(40);
        let preset = preset();
        let assignments = select_meshes(&points, &preset, "Rocks", 1).unwrap();
        let batches = build_batches(&points, &assignments, &preset);

        let total: usize = batches.iter().map(|b| b.transforms.len()).sum();
        assert_eq!(total, 40);

        for batch in &batches {
            match batch.mesh.as_str() {
                "rock_small" => assert!(batch.custom_data.is_none()),
                "rock_big" => {
                    let data = batch.custom_data.as_ref().unwrap();
                    assert_eq!(data.len(), batch.transforms.len() * TAG_FLOATS);
                    assert_eq!(TagEntry::decode(&data[..TAG_FLOATS]), TagEntry::new(0, 1));
                }
                other => panic!("unexpected mesh {}", other),
            }
        }
    }

    #[test]
    fn test_shared_mesh_keeps_picking_candidate() {
        // Same mesh in two sets, only the second carries a payload
        let preset = SpawnPreset {
            sets: vec![
                SpawnSet {
                    name: "Plain".to_string(),
                    candidates: vec![SpawnCandidate::new("rock", 1)],
                },
                SpawnSet {
                    name: "Ore".to_string(),
                    candidates: vec![SpawnCandidate::new("rock", 1)
                        .with_user_data(InstanceUserData::Tag("iron".to_string()))],
                },
            ],
        };
        let points = points(6);
        let assignments = select_meshes(&points, &preset, "Ore", 2).unwrap();
        assert!(assignments.iter().all(|a| a.tag == TagEntry::new(1, 0)));

        let batches = build_batches(&points, &assignments, &preset);
        assert_eq!(batches.len(), 1);
        let data = batches[0].custom_data.as_ref().unwrap();
        for chunk in data.chunks(TAG_FLOATS) {
            let tag = TagEntry::decode(chunk);
            assert_eq!(tag, TagEntry::new(1, 0));
            assert_eq!(preset.user_data(tag), Some(&InstanceUserData::Tag("iron".to_string())));
        }
    }
}
