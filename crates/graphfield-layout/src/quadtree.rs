//! Quadtree level pyramid for approximate many-body repulsion.
//!
//! Level `L` is a square grid of side `2^(L+1)` covering the simulation space.
//! Every point is scattered into the cell containing it at each level, so a
//! cell holds `(sumX, sumY, count)` of its points and the centroid of a cell is
//! available without walking individual points. Positions outside the space
//! are clamped into the border cells, which keeps `count` summing to `N` on
//! every level.

use crate::texture::{AccumulationBuffer, CellAggregate};

/// Number of quadtree levels for a space size: `floor(log2(space_size))`.
pub fn level_count(space_size: f32) -> usize {
    if !space_size.is_finite() || space_size < 2.0 {
        return 0;
    }
    space_size.log2().floor() as usize
}

/// Side of the grid at `level`.
pub fn level_side(level: usize) -> usize {
    1usize << (level + 1)
}

/// Edge length of one cell at `level`.
pub fn cell_size(space_size: f32, level: usize) -> f32 {
    space_size / level_side(level) as f32
}

/// Cell containing `(x, y)` at `level`, clamped into the grid.
pub fn cell_of(space_size: f32, level: usize, x: f32, y: f32) -> (usize, usize) {
    let side = level_side(level);
    let size = cell_size(space_size, level);
    let clamp = |v: f32| -> usize {
        let c = (v / size).floor();
        if c.is_nan() || c < 0.0 {
            0
        } else {
            (c as usize).min(side - 1)
        }
    };
    (clamp(x), clamp(y))
}

/// Offset of `level` in a buffer that concatenates every level coarsest first.
pub fn level_offset(level: usize) -> usize {
    // 4 + 16 + ... + 4^level
    ((1usize << (2 * (level + 1))) - 4) / 3
}

/// Total cells over `levels` concatenated levels.
pub fn pyramid_cells(levels: usize) -> usize {
    level_offset(levels)
}

/// Barnes-Hut acceptance: a cell far enough away for its centroid to stand in
/// for its points.
pub fn accepts(cell_size: f32, distance: f32, theta: f32) -> bool {
    cell_size / distance < theta
}

/// The level pyramid, rebuilt from current positions every tick.
#[derive(Debug)]
pub struct QuadtreeLevels {
    space_size: f32,
    levels: Vec<AccumulationBuffer>,
    built_generation: Option<u64>,
}

impl QuadtreeLevels {
    /// Allocate every level for `space_size`. Nothing is built yet.
    pub fn new(space_size: f32) -> Self {
        let levels = (0..level_count(space_size))
            .map(|level| AccumulationBuffer::new(level_side(level)))
            .collect();
        Self {
            space_size,
            levels,
            built_generation: None,
        }
    }

    pub fn space_size(&self) -> f32 {
        self.space_size
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Resource generation the levels were last built from.
    pub fn built_generation(&self) -> Option<u64> {
        self.built_generation
    }

    /// Whether the levels describe the resource set with `generation`.
    pub fn is_current(&self, generation: u64) -> bool {
        self.built_generation == Some(generation)
    }

    /// Forget the last build so the next force phase is skipped.
    pub fn invalidate(&mut self) {
        self.built_generation = None;
    }

    /// Clear every level and scatter the first `point_count` texels into it.
    pub fn build(&mut self, texels: &[[f32; 4]], point_count: usize, generation: u64) {
        for (level, buffer) in self.levels.iter_mut().enumerate() {
            buffer.clear();
            for texel in &texels[..point_count.min(texels.len())] {
                let (cx, cy) = cell_of(self.space_size, level, texel[0], texel[1]);
                buffer.scatter(cx, cy, texel[0], texel[1], 1.0);
            }
        }
        self.built_generation = Some(generation);
    }

    /// Aggregate of cell `(cx, cy)` at `level`.
    pub fn cell(&self, level: usize, cx: usize, cy: usize) -> CellAggregate {
        self.levels
            .get(level)
            .map(|buffer| buffer.get(cx, cy))
            .unwrap_or_default()
    }

    /// Sum of `count` over every cell of `level`.
    pub fn total_count(&self, level: usize) -> f32 {
        self.levels
            .get(level)
            .map(AccumulationBuffer::total_count)
            .unwrap_or(0.0)
    }
}
