//! Generation points and their attribute bag.
//!
//! Points are what every graph stage consumes and produces. The world is
//! Y-up: height is `translation.y`, the ground plane is (x, z).

use bevy::prelude::*;
use std::collections::BTreeMap;

/// Name of the attribute carrying a point's biome.
pub const BIOME_ATTRIBUTE: &str = "Biome";
/// Name of the attribute carrying the priority that produced `Biome`.
pub const BIOME_PRIORITY_ATTRIBUTE: &str = "BiomePriority";

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Int(i32),
    Float(f64),
    Name(String),
}

impl AttributeValue {
    /// Numeric view used by range filters. Names are not numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Name(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationPoint {
    pub transform: Transform,
    /// 0..1, multiplied into layer density
    pub density: f32,
    /// 0 = flat, 1 = vertical
    pub steepness: f32,
    pub seed: i32,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl GenerationPoint {
    pub fn new(position: Vec3, seed: i32) -> Self {
        Self {
            transform: Transform::from_translation(position),
            density: 1.0,
            steepness: 0.0,
            seed,
            attributes: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.transform.translation
    }

    /// Position projected on the ground plane.
    #[inline]
    pub fn ground(&self) -> Vec2 {
        Vec2::new(self.transform.translation.x, self.transform.translation.z)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn int_attribute(&self, name: &str) -> Option<i32> {
        match self.attributes.get(name) {
            Some(AttributeValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn name_attribute(&self, name: &str) -> Option<&str> {
        match self.attributes.get(name) {
            Some(AttributeValue::Name(v)) if !v.is_empty() => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: AttributeValue) {
        self.attributes.insert(name.into(), value);
    }

    /// Biome assigned by an earlier stage, if any.
    pub fn biome(&self) -> Option<&str> {
        self.name_attribute(BIOME_ATTRIBUTE)
    }

    /// Priority a later biome must beat to replace what earlier stages
    /// assigned. An explicit `BiomePriority` is used as is; a `Biome` name
    /// alone reads as 0; a point with neither accepts any biome.
    pub fn seeded_biome_priority(&self) -> i32 {
        match (self.int_attribute(BIOME_PRIORITY_ATTRIBUTE), self.biome()) {
            (Some(priority), _) => priority,
            (None, Some(_)) => 0,
            (None, None) => i32::MAX,
        }
    }

    pub fn set_biome(&mut self, name: &str, priority: i32) {
        self.set_attribute(BIOME_ATTRIBUTE, AttributeValue::Name(name.to_string()));
        self.set_attribute(BIOME_PRIORITY_ATTRIBUTE, AttributeValue::Int(priority));
    }
}
