//! Fractal noise written into point density or an attribute.
//!
//! Used upstream of classification to drive filters (moisture, rockiness) and
//! by layers to break up uniform scattering. Values are in 0..1 before
//! brightness and contrast are applied.

use bevy::prelude::*;
use noise::{Billow, Fbm, MultiFractal, NoiseFn, Perlin};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::point::{AttributeValue, GenerationPoint};
use crate::random::seeded_rng;

/// World units are small compared to useful noise frequencies.
pub const MAGIC_SCALE_FACTOR: f64 = 0.0001;

/// Octave cap of the `noise` crate's fractal generators.
const MAX_ITERATIONS: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NoiseMode {
    #[default]
    Perlin,
    /// Billowy absolute-value octaves
    FractionalBrownian,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum NoiseTarget {
    #[default]
    Density,
    Attribute(String),
}

/// Ground-plane box the noise tiles across (x, z).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TilingBox {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiomesNoise {
    pub mode: NoiseMode,
    pub iterations: u32,
    pub brightness: f64,
    pub contrast: f64,
    pub scale: f64,
    /// Upper bound of the seed-derived sampling offset
    pub random_offset: f64,
    pub tiling: Option<TilingBox>,
    pub target: NoiseTarget,
}

impl Default for BiomesNoise {
    fn default() -> Self {
        Self {
            mode: NoiseMode::Perlin,
            iterations: 4,
            brightness: 0.0,
            contrast: 1.0,
            scale: 1.0,
            random_offset: 100_000.0,
            tiling: None,
            target: NoiseTarget::Density,
        }
    }
}

enum Fractal {
    Perlin(Fbm<Perlin>),
    Brownian(Billow<Perlin>),
}

impl Fractal {
    #[inline]
    fn value(&self, position: [f64; 2]) -> f64 {
        let raw = match self {
            Fractal::Perlin(fbm) => fbm.get(position),
            Fractal::Brownian(billow) => billow.get(position),
        };
        0.5 + 0.5 * raw
    }
}

/// Seeded sampler for one node execution.
pub struct NoiseSampler {
    fractal: Fractal,
    offset: [f64; 2],
    frequency: f64,
    brightness: f64,
    contrast: f64,
    tiling: Option<TilingBox>,
}

impl NoiseSampler {
    /// Noise value at a world position (height ignored).
    pub fn sample(&self, position: Vec3) -> f64 {
        let x = position.x as f64;
        let z = position.z as f64;

        let value = match self.tiling {
            Some(tile) => self.tiled_value(tile, x, z),
            None => self.fractal.value([
                x * self.frequency + self.offset[0],
                z * self.frequency + self.offset[1],
            ]),
        };

        apply_contrast(self.brightness + value, self.contrast)
    }

    /// Blend four samples taken relative to each box edge so the pattern
    /// wraps seamlessly across the box.
    fn tiled_value(&self, tile: TilingBox, x: f64, z: f64) -> f64 {
        let left = x - tile.min[0] as f64;
        let right = x - tile.max[0] as f64;
        let top = z - tile.min[1] as f64;
        let bottom = z - tile.max[1] as f64;

        let width = (tile.max[0] - tile.min[0]) as f64;
        let depth = (tile.max[1] - tile.min[1]) as f64;
        let frac_x = if width > 0.0 { (left / width).clamp(0.0, 1.0) } else { 0.0 };
        let frac_z = if depth > 0.0 { (top / depth).clamp(0.0, 1.0) } else { 0.0 };

        let f = self.frequency;
        let v00 = self.fractal.value([left * f, top * f]);
        let v10 = self.fractal.value([right * f, top * f]);
        let v01 = self.fractal.value([left * f, bottom * f]);
        let v11 = self.fractal.value([right * f, bottom * f]);

        let near = v00 + (v10 - v00) * frac_x;
        let far = v01 + (v11 - v01) * frac_x;
        near + (far - near) * frac_z
    }
}

impl BiomesNoise {
    pub fn sampler(&self, seed: i32) -> NoiseSampler {
        let octaves = self.iterations.clamp(1, MAX_ITERATIONS) as usize;
        let noise_seed = seed as u32;
        let fractal = match self.mode {
            NoiseMode::Perlin => Fractal::Perlin(Fbm::<Perlin>::new(noise_seed).set_octaves(octaves)),
            NoiseMode::FractionalBrownian => {
                Fractal::Brownian(Billow::<Perlin>::new(noise_seed).set_octaves(octaves))
            }
        };

        let mut rng = seeded_rng(seed);
        let offset = [
            self.random_offset * rng.gen::<f64>(),
            self.random_offset * rng.gen::<f64>(),
        ];

        NoiseSampler {
            fractal,
            offset,
            frequency: MAGIC_SCALE_FACTOR * self.scale,
            brightness: self.brightness,
            contrast: self.contrast,
            tiling: self.tiling,
        }
    }

    /// Evaluate noise for every point and write it to the target.
    pub fn apply(&self, points: &mut [GenerationPoint], seed: i32) {
        let sampler = self.sampler(seed);
        let values: Vec<f64> = points
            .par_iter()
            .map(|point| sampler.sample(point.position()))
            .collect();

        for (point, value) in points.iter_mut().zip(values) {
            match &self.target {
                NoiseTarget::Density => point.density = value as f32,
                NoiseTarget::Attribute(name) => {
                    point.set_attribute(name.clone(), AttributeValue::Float(value))
                }
            }
        }
    }
}

/// Logistic contrast curve around 0.5. Contrast 1 is the identity, 0 or
/// less flattens everything to 0.5.
pub fn apply_contrast(value: f64, contrast: f64) -> f64 {
    if contrast == 1.0 {
        return value;
    }
    if contrast <= 0.0 {
        return 0.5;
    }

    let value = value.clamp(0.0, 1.0);
    if value == 1.0 {
        return 1.0;
    }
    1.0 / (1.0 + (value / (1.0 - value)).powf(-contrast))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points() -> Vec<GenerationPoint> {
        (0..64)
            .map(|i| {
                let x = (i % 8) as f32 * 937.0;
                let z = (i / 8) as f32 * 1213.0;
                GenerationPoint::new(Vec3::new(x, 0.0, z), i)
            })
            .collect()
    }

    #[test]
    fn test_contrast_curve() {
        assert_eq!(apply_contrast(0.3, 1.0), 0.3);
        assert_eq!(apply_contrast(0.9, 0.0), 0.5);
        assert_eq!(apply_contrast(1.5, 2.0), 1.0);
        assert_eq!(apply_contrast(-1.0, 2.0), 0.0);

        // Midpoint is a fixed point, higher contrast pushes values apart
        assert!((apply_contrast(0.5, 3.0) - 0.5).abs() < 1e-12);
        assert!(apply_contrast(0.7, 3.0) > 0.7);
        assert!(apply_contrast(0.3, 3.0) < 0.3);
    }

    #[test]
    fn test_same_seed_same_values() {
        let noise = BiomesNoise::default();
        let mut a = grid_points();
        let mut b = grid_points();
        noise.apply(&mut a, 77);
        noise.apply(&mut b, 77);

        for (pa, pb) in a.iter().zip(&b) {
            assert_eq!(pa.density, pb.density);
        }
    }

    #[test]
    fn test_attribute_target() {
        let noise = BiomesNoise {
            target: NoiseTarget::Attribute("Moisture".to_string()),
            scale: 20.0,
            ..Default::default()
        };
        let mut points = grid_points();
        noise.apply(&mut points, 3);

        for point in &points {
            // Density untouched, attribute written
            assert_eq!(point.density, 1.0);
            assert!(matches!(point.attribute("Moisture"), Some(AttributeValue::Float(_))));
        }
    }

    #[test]
    fn test_tiling_matches_at_opposite_edges() {
        let noise = BiomesNoise {
            tiling: Some(TilingBox { min: [0.0, 0.0], max: [5000.0, 5000.0] }),
            scale: 10.0,
            ..Default::default()
        };
        let sampler = noise.sampler(11);

        // Left and right edges sample the same pair of noise positions
        for z in [0.0f32, 1250.0, 2500.0, 4999.0] {
            let west = sampler.sample(Vec3::new(0.0, 0.0, z));
            let east = sampler.sample(Vec3::new(5000.0, 0.0, z));
            assert!((west - east).abs() < 1e-9, "z={} west={} east={}", z, west, east);
        }
    }
}
