//! Texture-encoded state: square point textures and accumulation buffers.
//!
//! Point `i` lives in cell `(i mod S, i div S)` of a square texture with side
//! `S = ceil(sqrt(N))`. Cells at or past `N` are unused and stay zero.

use std::collections::HashMap;

/// Mapping between point indices and cells of a square texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureLayout {
    point_count: usize,
    side: usize,
}

impl TextureLayout {
    /// Layout for `point_count` points.
    pub fn for_points(point_count: usize) -> Self {
        let mut side = (point_count as f64).sqrt().ceil() as usize;
        // Guard float rounding at perfect squares.
        while side * side < point_count {
            side += 1;
        }
        while side > 0 && (side - 1) * (side - 1) >= point_count {
            side -= 1;
        }
        Self { point_count, side }
    }

    /// Number of points stored.
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Side of the square texture.
    pub fn side(&self) -> usize {
        self.side
    }

    /// Number of cells, used or not.
    pub fn cell_count(&self) -> usize {
        self.side * self.side
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    /// Cell coordinate of a point index.
    pub fn coord(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.point_count {
            return None;
        }
        Some((index % self.side, index / self.side))
    }

    /// Point index stored at a cell, if the cell is in use.
    pub fn index(&self, x: usize, y: usize) -> Option<usize> {
        if x >= self.side || y >= self.side {
            return None;
        }
        let index = y * self.side + x;
        (index < self.point_count).then_some(index)
    }
}

/// One accumulator cell: `(sumX, sumY, count)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct CellAggregate {
    pub sum_x: f32,
    pub sum_y: f32,
    pub count: f32,
}

impl CellAggregate {
    /// Centroid of the accumulated points, if any.
    pub fn centroid(&self) -> Option<[f32; 2]> {
        (self.count > 0.0).then(|| [self.sum_x / self.count, self.sum_y / self.count])
    }

    fn add(&mut self, x: f32, y: f32, weight: f32) {
        self.sum_x += x;
        self.sum_y += y;
        self.count += weight;
    }
}

/// Side at or below which an accumulation buffer stores every cell.
const DENSE_SIDE_LIMIT: usize = 512;

#[derive(Debug, Clone)]
enum CellStorage {
    Dense(Vec<CellAggregate>),
    Sparse(HashMap<u32, CellAggregate>),
}

/// A square grid of additive accumulators.
///
/// Scattering a value into a cell adds it to whatever is there, so the order
/// of scatters does not matter. Small grids are stored densely; large grids
/// keep only touched cells.
#[derive(Debug, Clone)]
pub struct AccumulationBuffer {
    side: usize,
    storage: CellStorage,
}

impl AccumulationBuffer {
    /// A zeroed buffer of `side * side` cells.
    pub fn new(side: usize) -> Self {
        let storage = if side <= DENSE_SIDE_LIMIT {
            CellStorage::Dense(vec![CellAggregate::default(); side * side])
        } else {
            CellStorage::Sparse(HashMap::new())
        };
        Self { side, storage }
    }

    pub fn side(&self) -> usize {
        self.side
    }

    /// Reset every cell to zero.
    pub fn clear(&mut self) {
        match &mut self.storage {
            CellStorage::Dense(cells) => cells.fill(CellAggregate::default()),
            CellStorage::Sparse(cells) => cells.clear(),
        }
    }

    /// Add `(x, y, weight)` into cell `(cx, cy)`. Out-of-range cells are ignored.
    pub fn scatter(&mut self, cx: usize, cy: usize, x: f32, y: f32, weight: f32) {
        if cx >= self.side || cy >= self.side {
            return;
        }
        let key = cy * self.side + cx;
        match &mut self.storage {
            CellStorage::Dense(cells) => cells[key].add(x, y, weight),
            CellStorage::Sparse(cells) => cells.entry(key as u32).or_default().add(x, y, weight),
        }
    }

    /// Read cell `(cx, cy)`; empty or out-of-range cells read as zero.
    pub fn get(&self, cx: usize, cy: usize) -> CellAggregate {
        if cx >= self.side || cy >= self.side {
            return CellAggregate::default();
        }
        let key = cy * self.side + cx;
        match &self.storage {
            CellStorage::Dense(cells) => cells[key],
            CellStorage::Sparse(cells) => cells.get(&(key as u32)).copied().unwrap_or_default(),
        }
    }

    /// Sum of `count` over all cells.
    pub fn total_count(&self) -> f32 {
        match &self.storage {
            CellStorage::Dense(cells) => cells.iter().map(|c| c.count).sum(),
            CellStorage::Sparse(cells) => cells.values().map(|c| c.count).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_mapping_is_bijection() {
        for n in [1usize, 2, 3, 4, 5, 15, 16, 17, 99, 100, 101, 1000] {
            let layout = TextureLayout::for_points(n);
            let side = layout.side();
            assert_eq!(side, (n as f64).sqrt().ceil() as usize, "side for {}", n);

            let mut seen = HashSet::new();
            for i in 0..n {
                let (x, y) = layout.coord(i).unwrap();
                assert!(x < side && y < side);
                assert!(seen.insert((x, y)), "cell reused for {}", i);
                assert_eq!(layout.index(x, y), Some(i));
            }
            assert_eq!(layout.coord(n), None);
        }
    }

    #[test]
    fn test_unused_cells_have_no_index() {
        let layout = TextureLayout::for_points(5);
        assert_eq!(layout.side(), 3);
        assert_eq!(layout.index(2, 1), None);
        assert_eq!(layout.index(2, 2), None);
        assert_eq!(layout.index(3, 0), None);
    }

    #[test]
    fn test_empty_layout() {
        let layout = TextureLayout::for_points(0);
        assert!(layout.is_empty());
        assert_eq!(layout.cell_count(), 0);
        assert_eq!(layout.coord(0), None);
    }

    #[test]
    fn test_accumulation_is_additive() {
        for side in [4, DENSE_SIDE_LIMIT * 2] {
            let mut buffer = AccumulationBuffer::new(side);
            buffer.scatter(1, 2, 1.0, 2.0, 1.0);
            buffer.scatter(1, 2, 3.0, 4.0, 1.0);
            buffer.scatter(side, 0, 9.0, 9.0, 1.0);

            let cell = buffer.get(1, 2);
            assert_eq!(cell.count, 2.0);
            assert_eq!(cell.centroid(), Some([2.0, 3.0]));
            assert_eq!(buffer.total_count(), 2.0);
            assert_eq!(buffer.get(0, 0).centroid(), None);

            buffer.clear();
            assert_eq!(buffer.total_count(), 0.0);
        }
    }
}
