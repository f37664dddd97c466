//! Pull clustered points toward their cluster.
//!
//! Clusters live in a square texture of their own; each point stores the cell
//! of its cluster, or [`UNCLUSTERED`]. Phase (a) accumulates per-cluster
//! centroids, phase (b) pulls each clustered point toward its cluster's
//! explicit position when one was given and toward the centroid otherwise.

use super::ForceUniforms;
use crate::texture::{AccumulationBuffer, TextureLayout};

/// Cell coordinate marking a point without a cluster.
pub const UNCLUSTERED: [f32; 2] = [-1.0, -1.0];

/// Cluster assignment, explicit positions and per-point coefficients.
#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    layout: TextureLayout,
    cells: Vec<[f32; 2]>,
    /// `(x, y, has_position, unused)` per cluster cell.
    positions: Vec<[f32; 4]>,
    coefficients: Vec<f32>,
}

impl ClusterState {
    /// Build from per-point cluster ids. Without any ids the state is empty.
    pub fn build(
        point_count: usize,
        clusters: Option<&[Option<u32>]>,
        cluster_positions: Option<&[Option<[f32; 2]>]>,
        cluster_strength: Option<&[f32]>,
    ) -> Self {
        let Some(clusters) = clusters else {
            return Self::default();
        };
        let cluster_count = clusters
            .iter()
            .flatten()
            .map(|&id| id as usize + 1)
            .max()
            .unwrap_or(0);
        if cluster_count == 0 {
            return Self::default();
        }

        let layout = TextureLayout::for_points(cluster_count);
        let cells = (0..point_count)
            .map(|i| {
                clusters
                    .get(i)
                    .copied()
                    .flatten()
                    .and_then(|id| layout.coord(id as usize))
                    .map(|(x, y)| [x as f32, y as f32])
                    .unwrap_or(UNCLUSTERED)
            })
            .collect();

        let mut positions = vec![[0.0f32; 4]; layout.cell_count()];
        if let Some(explicit) = cluster_positions {
            for (id, position) in explicit.iter().enumerate().take(cluster_count) {
                if let Some([x, y]) = position {
                    positions[id] = [*x, *y, 1.0, 0.0];
                }
            }
        }

        let coefficients = (0..point_count)
            .map(|i| cluster_strength.and_then(|s| s.get(i).copied()).unwrap_or(1.0))
            .collect();

        tracing::debug!("cluster state built: {} clusters", cluster_count);

        Self {
            layout,
            cells,
            positions,
            coefficients,
        }
    }

    pub fn cluster_count(&self) -> usize {
        self.layout.point_count()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    /// Cluster texture layout.
    pub fn layout(&self) -> TextureLayout {
        self.layout
    }

    /// Cluster cell per point.
    pub fn cells(&self) -> &[[f32; 2]] {
        &self.cells
    }

    /// Explicit position per cluster cell.
    pub fn positions(&self) -> &[[f32; 4]] {
        &self.positions
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    fn cell(&self, point: usize) -> Option<(usize, usize)> {
        let cell = *self.cells.get(point)?;
        if cell == UNCLUSTERED {
            return None;
        }
        Some((cell[0] as usize, cell[1] as usize))
    }
}

/// Phase (a): per-cluster position sums.
pub fn accumulate(positions: &[[f32; 4]], state: &ClusterState, point_count: usize) -> AccumulationBuffer {
    let mut centroids = AccumulationBuffer::new(state.layout.side());
    for (i, p) in positions.iter().enumerate().take(point_count) {
        if let Some((cx, cy)) = state.cell(i) {
            centroids.scatter(cx, cy, p[0], p[1], 1.0);
        }
    }
    centroids
}

/// Phase (b): attract every clustered point toward its target.
pub fn apply(
    positions: &[[f32; 4]],
    velocity: &mut [[f32; 2]],
    state: &ClusterState,
    centroids: &AccumulationBuffer,
    u: &ForceUniforms,
) {
    let k = u.cluster_force * u.alpha;
    if k == 0.0 || state.is_empty() {
        return;
    }
    let side = state.layout.side();

    for (i, (p, v)) in positions
        .iter()
        .zip(velocity.iter_mut())
        .take(u.point_count as usize)
        .enumerate()
    {
        let Some((cx, cy)) = state.cell(i) else {
            continue;
        };
        let explicit = state.positions[cy * side + cx];
        let target = if explicit[2] > 0.0 {
            [explicit[0], explicit[1]]
        } else {
            match centroids.get(cx, cy).centroid() {
                Some(c) => c,
                None => continue,
            }
        };
        let coefficient = state.coefficients.get(i).copied().unwrap_or(1.0);
        v[0] += (target[0] - p[0]) * k * coefficient;
        v[1] += (target[1] - p[1]) * k * coefficient;
    }
}
