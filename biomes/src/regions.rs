//! Explicit biome regions.
//!
//! Designers can force a biome inside a closed outline (a lake shore, a
//! village clearing). Points inside get their `Biome` / `BiomePriority`
//! attributes pre-seeded so classification keeps the explicit answer unless
//! an authored biome has an even lower priority.

use bevy::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::point::GenerationPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomeRegion {
    pub biome: String,
    #[serde(default)]
    pub priority: i32,
    /// Closed outline on the ground plane (x, z). Last point connects to the first.
    pub outline: Vec<[f32; 2]>,
}

impl BiomeRegion {
    pub fn new(biome: impl Into<String>, priority: i32, outline: Vec<[f32; 2]>) -> Self {
        Self {
            biome: biome.into(),
            priority,
            outline,
        }
    }

    /// Even-odd test against the outline.
    pub fn contains(&self, ground: Vec2) -> bool {
        if self.outline.len() < 3 {
            return false;
        }

        let mut inside = false;
        let mut j = self.outline.len() - 1;
        for i in 0..self.outline.len() {
            let [xi, zi] = self.outline[i];
            let [xj, zj] = self.outline[j];
            if (zi > ground.y) != (zj > ground.y)
                && ground.x < (xj - xi) * (ground.y - zi) / (zj - zi) + xi
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Pre-seed points covered by regions. Where regions overlap the lowest
/// priority wins; a point keeps an existing pre-seed with a lower priority.
/// Returns the number of points stamped.
pub fn stamp_regions(regions: &[BiomeRegion], points: &mut [GenerationPoint]) -> usize {
    if regions.is_empty() {
        return 0;
    }

    let stamps: Vec<Option<&BiomeRegion>> = points
        .par_iter()
        .map(|point| {
            let ground = point.ground();
            let current = point.seeded_biome_priority();
            regions
                .iter()
                .filter(|region| region.contains(ground))
                .min_by_key(|region| region.priority)
                .filter(|region| region.priority < current)
        })
        .collect();

    let mut stamped = 0;
    for (point, region) in points.iter_mut().zip(stamps) {
        if let Some(region) = region {
            point.set_biome(&region.biome, region.priority);
            stamped += 1;
        }
    }
    stamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biomes::{BiomeDefinition, BiomesSettings};
    use crate::point::{AttributeValue, BIOME_PRIORITY_ATTRIBUTE};

    fn square(min: f32, max: f32) -> Vec<[f32; 2]> {
        vec![[min, min], [max, min], [max, max], [min, max]]
    }

    #[test]
    fn test_contains() {
        let region = BiomeRegion::new("Lake", 0, square(0.0, 10.0));
        assert!(region.contains(Vec2::new(5.0, 5.0)));
        assert!(!region.contains(Vec2::new(15.0, 5.0)));
        assert!(!region.contains(Vec2::new(-1.0, -1.0)));

        // Degenerate outline contains nothing
        let line = BiomeRegion::new("Line", 0, vec![[0.0, 0.0], [1.0, 1.0]]);
        assert!(!line.contains(Vec2::new(0.5, 0.5)));
    }

    #[test]
    fn test_overlap_lowest_priority_wins() {
        let regions = vec![
            BiomeRegion::new("Village", 20, square(0.0, 100.0)),
            BiomeRegion::new("Lake", 10, square(50.0, 150.0)),
        ];
        let mut points = vec![
            GenerationPoint::new(Vec3::new(25.0, 0.0, 25.0), 0),
            GenerationPoint::new(Vec3::new(75.0, 0.0, 75.0), 1),
            GenerationPoint::new(Vec3::new(500.0, 0.0, 500.0), 2),
        ];

        assert_eq!(stamp_regions(&regions, &mut points), 2);
        assert_eq!(points[0].biome(), Some("Village"));
        assert_eq!(points[1].biome(), Some("Lake"));
        assert_eq!(points[2].biome(), None);
    }

    #[test]
    fn test_existing_lower_priority_kept() {
        let regions = vec![BiomeRegion::new("Village", 20, square(0.0, 100.0))];
        let mut point = GenerationPoint::new(Vec3::new(10.0, 0.0, 10.0), 0);
        point.set_biome("Road", 1);

        let mut points = vec![point];
        assert_eq!(stamp_regions(&regions, &mut points), 0);
        assert_eq!(points[0].biome(), Some("Road"));
    }

    #[test]
    fn test_priority_without_name_matches_classifier() {
        let mut point = GenerationPoint::new(Vec3::new(10.0, 0.0, 10.0), 0);
        point.set_attribute(BIOME_PRIORITY_ATTRIBUTE, AttributeValue::Int(15));

        // Region and classifier both need to beat 15
        let weaker = vec![BiomeRegion::new("Village", 20, square(0.0, 100.0))];
        let mut points = vec![point.clone()];
        assert_eq!(stamp_regions(&weaker, &mut points), 0);

        let mut settings = BiomesSettings::default();
        settings.biomes.push(BiomeDefinition::new("Plains", 20));
        assert_eq!(settings.prepare().detect_biome(&point), None);

        let stronger = vec![BiomeRegion::new("Lake", 10, square(0.0, 100.0))];
        let mut points = vec![point];
        assert_eq!(stamp_regions(&stronger, &mut points), 1);
        assert_eq!(points[0].biome(), Some("Lake"));
    }
}
