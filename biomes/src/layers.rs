//! Biome layers: turning classified points into spawn points.
//!
//! A biome owns an ordered list of layers (trees, then bushes, then grass).
//! Each layer keeps a random subset of the biome's points, jitters them,
//! and hands them to mesh selection with its spawn set name. Earlier layers
//! can exclude later ones through a shared [`FootprintGrid`].

use bevy::prelude::*;
use noise::{NoiseFn, Perlin};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::biomes::BiomeDefinition;
use crate::exclusion::{Footprint, FootprintGrid};
use crate::noise_field::MAGIC_SCALE_FACTOR;
use crate::point::GenerationPoint;
use crate::random::{combine_seed, seeded_rng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExclusionMode {
    /// Footprint sized by the layer's mesh radius and instance scale
    MeshBounds,
    /// Footprint of a bare point
    Points,
    DontExclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeMode {
    /// Inside the biome, close to its border
    Inner,
    /// Outside the biome, close to its border
    Outer,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeSettings {
    pub mode: EdgeMode,
    pub distance: f32,
}

impl Default for EdgeSettings {
    fn default() -> Self {
        Self {
            mode: EdgeMode::Inner,
            distance: 200.0,
        }
    }
}

/// Noise mask: points survive where the noise value is within [low, high].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerNoise {
    /// Higher is higher frequency
    pub scale: f64,
    pub low: f64,
    pub high: f64,
    pub seed: f64,
}

impl Default for LayerNoise {
    fn default() -> Self {
        Self {
            scale: 8.0,
            low: 0.0,
            high: 0.5,
            seed: 10_000.0,
        }
    }
}

impl LayerNoise {
    fn accepts(&self, perlin: &Perlin, ground: Vec2) -> bool {
        let frequency = self.scale * MAGIC_SCALE_FACTOR;
        let value = 0.5
            + 0.5 * perlin.get([
                ground.x as f64 * frequency + self.seed,
                ground.y as f64 * frequency + self.seed,
            ]);
        value >= self.low && value <= self.high
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiomeLayer {
    pub enabled: bool,
    /// Name of the spawn set meshes are picked from
    pub spawn_set: String,
    pub seed: i32,
    /// Fraction of points kept, multiplied by point density
    pub density: f64,
    pub noise: Option<LayerNoise>,
    /// Skip points steeper than this
    pub max_slope: Option<f32>,
    /// Yaw only, ignore the point's own rotation
    pub absolute_rotation: bool,
    pub offset_y: f32,
    /// Maximum horizontal jitter distance
    pub transform_range: f32,
    pub scale_min: f32,
    pub scale_max: f32,
    pub in_exclusion: ExclusionMode,
    pub out_exclusion: ExclusionMode,
    /// Multiplier applied to `footprint_radius` for registered footprints
    pub out_bounds_scale: f32,
    /// Radius of the layer's meshes at scale 1
    pub footprint_radius: f32,
    pub edge: Option<EdgeSettings>,
}

impl Default for BiomeLayer {
    fn default() -> Self {
        Self {
            enabled: true,
            spawn_set: String::new(),
            seed: 0,
            density: 0.5,
            noise: Some(LayerNoise::default()),
            max_slope: None,
            absolute_rotation: false,
            offset_y: 0.0,
            transform_range: 0.0,
            scale_min: 0.8,
            scale_max: 1.2,
            in_exclusion: ExclusionMode::Points,
            out_exclusion: ExclusionMode::MeshBounds,
            out_bounds_scale: 0.5,
            footprint_radius: 50.0,
            edge: None,
        }
    }
}

/// Points produced by one layer.
#[derive(Debug, Clone)]
pub struct LayerOutput {
    pub layer_index: usize,
    pub spawn_set: String,
    pub points: Vec<GenerationPoint>,
}

impl BiomeLayer {
    pub fn for_set(spawn_set: impl Into<String>) -> Self {
        Self {
            spawn_set: spawn_set.into(),
            ..Default::default()
        }
    }

    /// Points of `biome` this layer considers, honouring edge mode.
    fn source_points<'a>(&self, biome: &str, points: &'a [GenerationPoint]) -> Vec<&'a GenerationPoint> {
        let (inside, outside): (Vec<&GenerationPoint>, Vec<&GenerationPoint>) =
            points.iter().partition(|point| point.biome() == Some(biome));

        let Some(edge) = self.edge else {
            return inside;
        };

        let (candidates, others) = match edge.mode {
            EdgeMode::Inner => (inside, outside),
            EdgeMode::Outer => (outside, inside),
        };
        let reach = edge.distance * edge.distance;
        candidates
            .into_par_iter()
            .filter(|point| {
                let ground = point.ground();
                others
                    .iter()
                    .any(|other| other.ground().distance_squared(ground) <= reach)
            })
            .collect()
    }

    /// Random survivors for this layer. Every draw happens before any
    /// filter so a point's result does not depend on which filters are on.
    fn place(&self, point: &GenerationPoint, perlin: &Perlin) -> Option<GenerationPoint> {
        let mut rng = seeded_rng(combine_seed(self.seed, point.seed));
        let keep_roll = rng.gen::<f64>();
        let jitter_angle = rng.gen::<f32>() * TAU;
        let jitter_distance = rng.gen::<f32>() * self.transform_range;
        let yaw = rng.gen::<f32>() * TAU;
        let scale_roll = rng.gen::<f32>();

        if keep_roll >= self.density * point.density as f64 {
            return None;
        }
        if let Some(noise) = &self.noise {
            if !noise.accepts(perlin, point.ground()) {
                return None;
            }
        }
        if let Some(max_slope) = self.max_slope {
            if point.steepness > max_slope {
                return None;
            }
        }

        let mut placed = point.clone();
        let offset = Vec2::from_angle(jitter_angle) * jitter_distance;
        placed.transform.translation += Vec3::new(offset.x, self.offset_y, offset.y);

        let spin = Quat::from_rotation_y(yaw);
        placed.transform.rotation = if self.absolute_rotation {
            spin
        } else {
            point.transform.rotation * spin
        };

        let scale = self.scale_min + (self.scale_max - self.scale_min) * scale_roll;
        placed.transform.scale = Vec3::splat(scale);
        placed.seed = combine_seed(point.seed, self.seed);
        Some(placed)
    }

    fn footprint_radius_for(&self, mode: ExclusionMode, placed: &GenerationPoint, bounds_scale: f32) -> Option<f32> {
        match mode {
            ExclusionMode::DontExclude => None,
            ExclusionMode::Points => Some(0.0),
            ExclusionMode::MeshBounds => {
                Some(self.footprint_radius * bounds_scale * placed.transform.scale.x)
            }
        }
    }

    /// Scatter this layer over the points of `biome`.
    pub fn scatter(
        &self,
        biome: &str,
        points: &[GenerationPoint],
        exclusion: &mut FootprintGrid,
    ) -> Vec<GenerationPoint> {
        if !self.enabled {
            return Vec::new();
        }

        let noise_seed = self.noise.map(|noise| noise.seed as u32).unwrap_or_default();
        let perlin = Perlin::new(noise_seed.wrapping_add(self.seed as u32));
        let candidates: Vec<Option<GenerationPoint>> = self
            .source_points(biome, points)
            .into_par_iter()
            .map(|point| self.place(point, &perlin))
            .collect();

        // Exclusion depends on what earlier layers placed, run it in order
        let mut accepted = Vec::new();
        for placed in candidates.into_iter().flatten() {
            let blocked = self
                .footprint_radius_for(self.in_exclusion, &placed, 1.0)
                .is_some_and(|radius| exclusion.overlaps(placed.ground(), radius));
            if !blocked {
                accepted.push(placed);
            }
        }

        for placed in &accepted {
            if let Some(radius) = self.footprint_radius_for(self.out_exclusion, placed, self.out_bounds_scale) {
                exclusion.insert(Footprint::new(placed.ground(), radius));
            }
        }

        accepted
    }
}

impl BiomeDefinition {
    /// Run every layer of this biome in order over the classified points.
    pub fn scatter_layers(&self, points: &[GenerationPoint]) -> Vec<LayerOutput> {
        let mut exclusion = FootprintGrid::new();
        let outputs: Vec<LayerOutput> = self
            .layers
            .iter()
            .enumerate()
            .filter(|(_, layer)| layer.enabled)
            .map(|(layer_index, layer)| LayerOutput {
                layer_index,
                spawn_set: layer.spawn_set.clone(),
                points: layer.scatter(&self.name, points, &mut exclusion),
            })
            .collect();

        debug!(
            "Biome '{}' scattered {} points over {} layers",
            self.name,
            outputs.iter().map(|output| output.points.len()).sum::<usize>(),
            outputs.len()
        );
        outputs
    }
}
