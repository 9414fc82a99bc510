//! Spatial hashing of placed footprints for inter-layer exclusion.
//!
//! Layers run in order inside a biome; each layer can register the
//! footprints of what it placed and later layers skip points that land on
//! them. Footprints are circles on the ground plane, bucketed into a hash
//! grid so each query only looks at nearby cells.

use bevy::prelude::*;
use std::collections::HashMap;

/// Size of each grid cell in world units.
/// Should be roughly the size of the largest footprint.
pub const EXCLUSION_CELL_SIZE: f32 = 256.0;

/// Widest footprint (in cells per axis) that is bucketed. Larger ones are
/// kept in a flat list and tested against every query.
const MAX_CELL_SPAN: i64 = 8;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Footprint {
    /// Center on the ground plane (x, z).
    pub center: Vec2,
    /// Zero for a bare point.
    pub radius: f32,
}

impl Footprint {
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
        }
    }

    #[inline]
    fn overlaps(&self, center: Vec2, radius: f32) -> bool {
        let reach = self.radius + radius;
        if reach <= 0.0 {
            return false;
        }
        self.center.distance_squared(center) < reach * reach
    }
}

#[derive(Default, Debug)]
pub struct FootprintGrid {
    /// Map from grid cell (x, z) to footprints overlapping that cell.
    cells: HashMap<(i32, i32), Vec<usize>>,
    footprints: Vec<Footprint>,
    /// Footprints too wide to bucket
    oversized: Vec<usize>,
}

impl FootprintGrid {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn world_to_cell(pos: Vec2) -> (i32, i32) {
        (
            (pos.x / EXCLUSION_CELL_SIZE).floor() as i32,
            (pos.y / EXCLUSION_CELL_SIZE).floor() as i32,
        )
    }

    fn cell_range(center: Vec2, radius: f32) -> ((i32, i32), (i32, i32)) {
        let extent = Vec2::splat(radius);
        (
            Self::world_to_cell(center - extent),
            Self::world_to_cell(center + extent),
        )
    }

    #[inline]
    fn is_oversized(min_cell: (i32, i32), max_cell: (i32, i32)) -> bool {
        let span_x = max_cell.0 as i64 - min_cell.0 as i64;
        let span_z = max_cell.1 as i64 - min_cell.1 as i64;
        span_x > MAX_CELL_SPAN || span_z > MAX_CELL_SPAN
    }

    pub fn insert(&mut self, footprint: Footprint) {
        let (min_cell, max_cell) = Self::cell_range(footprint.center, footprint.radius);

        let idx = self.footprints.len();
        self.footprints.push(footprint);

        if Self::is_oversized(min_cell, max_cell) {
            self.oversized.push(idx);
            return;
        }

        for cx in min_cell.0..=max_cell.0 {
            for cz in min_cell.1..=max_cell.1 {
                self.cells.entry((cx, cz)).or_default().push(idx);
            }
        }
    }

    /// Whether a circle at `center` overlaps any registered footprint.
    /// Two overlapping bucketed circles always share at least one cell.
    pub fn overlaps(&self, center: Vec2, radius: f32) -> bool {
        if self
            .oversized
            .iter()
            .any(|&idx| self.footprints[idx].overlaps(center, radius))
        {
            return true;
        }

        let (min_cell, max_cell) = Self::cell_range(center, radius.max(0.0));

        // Wide query: scanning every footprint is cheaper than every cell
        if Self::is_oversized(min_cell, max_cell) {
            return self
                .footprints
                .iter()
                .any(|footprint| footprint.overlaps(center, radius));
        }

        for cx in min_cell.0..=max_cell.0 {
            for cz in min_cell.1..=max_cell.1 {
                if let Some(indices) = self.cells.get(&(cx, cz)) {
                    if indices
                        .iter()
                        .any(|&idx| self.footprints[idx].overlaps(center, radius))
                    {
                        return true;
                    }
                }
            }
        }

        false
    }

    /// Whether a bare point lies inside any footprint.
    #[inline]
    pub fn point_blocked(&self, point: Vec2) -> bool {
        self.overlaps(point, 0.0)
    }

    pub fn len(&self) -> usize {
        self.footprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.footprints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_blocked() {
        let mut grid = FootprintGrid::new();

        // 50 unit boulder at origin
        grid.insert(Footprint::new(Vec2::ZERO, 50.0));

        assert!(grid.point_blocked(Vec2::new(30.0, 30.0)));
        assert!(!grid.point_blocked(Vec2::new(40.0, 40.0)));
        assert!(!grid.point_blocked(Vec2::new(1000.0, 0.0)));
    }

    #[test]
    fn test_overlap_across_cells() {
        let mut grid = FootprintGrid::new();

        // Sits right on a cell boundary
        grid.insert(Footprint::new(Vec2::new(EXCLUSION_CELL_SIZE - 1.0, 0.0), 10.0));

        assert!(grid.overlaps(Vec2::new(EXCLUSION_CELL_SIZE + 15.0, 0.0), 8.0));
        assert!(!grid.overlaps(Vec2::new(EXCLUSION_CELL_SIZE + 15.0, 0.0), 2.0));
    }

    #[test]
    fn test_bare_points_never_collide_with_each_other() {
        let mut grid = FootprintGrid::new();
        grid.insert(Footprint::new(Vec2::new(5.0, 5.0), 0.0));

        assert_eq!(grid.len(), 1);
        assert!(!grid.point_blocked(Vec2::new(5.0, 5.0)));
        // But a sized footprint on top of it does
        assert!(grid.overlaps(Vec2::new(5.0, 6.0), 2.0));
    }

    #[test]
    fn test_huge_footprints_skip_bucketing() {
        let mut grid = FootprintGrid::new();

        // Would cover millions of cells if bucketed
        grid.insert(Footprint::new(Vec2::ZERO, 1.0e6));
        assert!(grid.cells.is_empty());
        assert_eq!(grid.oversized, vec![0]);

        assert!(grid.point_blocked(Vec2::new(5.0e5, -5.0e5)));
        assert!(!grid.point_blocked(Vec2::new(2.0e6, 0.0)));

        // Wide queries still see bucketed footprints
        grid.insert(Footprint::new(Vec2::new(3.0e6, 0.0), 10.0));
        assert!(grid.overlaps(Vec2::new(3.0e6, 5.0e5), 6.0e5));
        assert!(grid.overlaps(Vec2::new(3.0e6, 0.0), f32::INFINITY));
    }
}
