//! Biome definitions and per-point biome classification.
//!
//! A biome preset is an author-ordered list of named biomes. Each biome has a
//! priority (lower wins), a list of filters that must all pass, and the layers
//! that scatter content inside it. [`BiomesSettings::prepare`] sorts the
//! enabled biomes once so classification can stop at the first match.

use bevy::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::layers::BiomeLayer;
use crate::point::GenerationPoint;

/// Priority of a biome that does not set one.
pub const DEFAULT_BIOME_PRIORITY: i32 = 5000;

fn default_priority() -> i32 {
    DEFAULT_BIOME_PRIORITY
}

fn default_enabled() -> bool {
    true
}

/// Predicate over a single point. Ranges are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BiomeFilter {
    Height { min: f32, max: f32 },
    Steepness { min: f32, max: f32 },
    Density { min: f32, max: f32 },
    /// Numeric attribute in range. Missing or non-numeric attributes fail.
    Attribute { name: String, min: f64, max: f64 },
    NameEquals { attribute: String, value: String },
    Not(Box<BiomeFilter>),
}

impl BiomeFilter {
    pub fn matches(&self, point: &GenerationPoint) -> bool {
        match self {
            BiomeFilter::Height { min, max } => {
                let height = point.position().y;
                height >= *min && height <= *max
            }
            BiomeFilter::Steepness { min, max } => point.steepness >= *min && point.steepness <= *max,
            BiomeFilter::Density { min, max } => point.density >= *min && point.density <= *max,
            BiomeFilter::Attribute { name, min, max } => point
                .attribute(name)
                .and_then(|value| value.as_f64())
                .is_some_and(|value| value >= *min && value <= *max),
            BiomeFilter::NameEquals { attribute, value } => {
                point.name_attribute(attribute) == Some(value.as_str())
            }
            BiomeFilter::Not(inner) => !inner.matches(point),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiomeDefinition {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub filters: Vec<BiomeFilter>,
    #[serde(default)]
    pub layers: Vec<BiomeLayer>,
}

impl BiomeDefinition {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            priority,
            filters: Vec::new(),
            layers: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: BiomeFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// All filters pass. Stops at the first failing one.
    pub fn matches(&self, point: &GenerationPoint) -> bool {
        self.filters.iter().all(|filter| filter.matches(point))
    }
}

/// Biome preset asset, biomes in author order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BiomesSettings {
    #[serde(default)]
    pub biomes: Vec<BiomeDefinition>,
}

impl BiomesSettings {
    pub fn from_ron_str(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    /// Settings of one biome, used by the layer stage to fetch its layers.
    pub fn find_settings(&self, name: &str) -> Option<&BiomeDefinition> {
        self.biomes.iter().find(|biome| biome.name == name)
    }

    /// Enabled biomes, stably sorted by ascending priority.
    pub fn prepare(&self) -> PreparedBiomes {
        let mut biomes: Vec<BiomeDefinition> = self
            .biomes
            .iter()
            .filter(|biome| biome.enabled)
            .cloned()
            .collect();
        biomes.sort_by_key(|biome| biome.priority);
        PreparedBiomes { biomes }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiomeMatch {
    pub name: String,
    pub priority: i32,
}

#[derive(Debug, Clone, Default)]
pub struct PreparedBiomes {
    biomes: Vec<BiomeDefinition>,
}

impl PreparedBiomes {
    pub fn iter(&self) -> impl Iterator<Item = &BiomeDefinition> {
        self.biomes.iter()
    }

    pub fn len(&self) -> usize {
        self.biomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.biomes.is_empty()
    }

    /// Biome of a point.
    ///
    /// A point may pre-seed its answer through the `Biome` / `BiomePriority`
    /// attributes (explicit regions do this). The first fully matching biome
    /// only replaces the pre-seeded answer when its priority is strictly
    /// lower; either way the scan stops there.
    pub fn detect_biome(&self, point: &GenerationPoint) -> Option<BiomeMatch> {
        let mut name = point.biome().map(str::to_string);
        let mut priority = point.seeded_biome_priority();

        if let Some(biome) = self.biomes.iter().find(|biome| biome.matches(point)) {
            if biome.priority < priority {
                name = Some(biome.name.clone());
                priority = biome.priority;
            }
        }

        name.map(|name| BiomeMatch { name, priority })
    }

    /// Classify every point and write the `Biome` / `BiomePriority`
    /// attributes. Returns how many points received a biome.
    pub fn classify_points(&self, points: &mut [GenerationPoint]) -> usize {
        let matches: Vec<Option<BiomeMatch>> = points
            .par_iter()
            .map(|point| self.detect_biome(point))
            .collect();

        let mut classified = 0;
        for (point, found) in points.iter_mut().zip(matches) {
            if let Some(found) = found {
                point.set_biome(&found.name, found.priority);
                classified += 1;
            }
        }

        debug!("Classified {}/{} points", classified, points.len());
        classified
    }
}
