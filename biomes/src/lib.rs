//! Layered biome scattering with persistent instance removal.
//!
//! Generation: points are classified into biomes, each biome's layers
//! scatter spawn points, and every spawn point picks a weighted mesh from a
//! spawn set. The resulting instances carry a provenance tag so gameplay can
//! look up the candidate (and its user data) that produced them.
//!
//! Runtime: [`runtime::InstanceController`] removes and restores instances
//! by durable handle and reconciles saved removals with regenerated or
//! streamed content.

pub mod biomes;
pub mod error;
pub mod exclusion;
pub mod layers;
pub mod mesh_selection;
pub mod noise_field;
pub mod point;
pub mod random;
pub mod regions;
pub mod runtime;
pub mod spawn_preset;
pub mod tags;

pub use biomes::{BiomeDefinition, BiomeFilter, BiomeMatch, BiomesSettings, PreparedBiomes};
pub use error::{BiomesError, Result};
pub use mesh_selection::{build_batches, select_meshes, MeshAssignment, MeshBatch};
pub use point::{AttributeValue, GenerationPoint};
pub use spawn_preset::{InstanceUserData, SpawnCandidate, SpawnPreset, SpawnSet};
pub use tags::TagEntry;
