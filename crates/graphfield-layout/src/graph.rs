//! Graph input consumed from the data layer.
//!
//! Positions and links arrive as flat arrays (`[x0, y0, x1, y1, ...]`,
//! `[src0, dst0, src1, dst1, ...]`); everything per-point or per-link beyond
//! that is optional.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{LayoutError, Position, Result};

/// Points, links and their optional attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphData {
    /// Flat `[x0, y0, x1, y1, ...]`.
    pub point_positions: Vec<f32>,
    /// Flat `[src0, dst0, src1, dst1, ...]`.
    pub links: Vec<u32>,
    /// Per-point diameter.
    pub point_sizes: Option<Vec<f32>>,
    /// Per-point cluster id; `None` leaves the point unclustered.
    pub point_clusters: Option<Vec<Option<u32>>>,
    /// Per-cluster explicit position overriding the computed centroid.
    pub cluster_positions: Option<Vec<Option<[f32; 2]>>>,
    /// Per-point multiplier for the cluster force (default 1).
    pub cluster_strength: Option<Vec<f32>>,
    /// Indices of points that never move.
    pub pinned_points: Vec<u32>,
    /// Per-link strength replacing the degree-derived default.
    pub link_strength: Option<Vec<f32>>,
}

impl GraphData {
    /// Graph with positions and links only.
    pub fn new(point_positions: Vec<f32>, links: Vec<u32>) -> Self {
        Self {
            point_positions,
            links,
            ..Default::default()
        }
    }

    /// Place `point_count` points at random around the middle of the space.
    pub fn random_positions(point_count: usize, space_size: f32, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        let spread = space_size / 4.0;
        let center = space_size / 2.0;
        (0..point_count)
            .flat_map(|_| {
                let x = center + (rng.random::<f32>() - 0.5) * 2.0 * spread;
                let y = center + (rng.random::<f32>() - 0.5) * 2.0 * spread;
                [x, y]
            })
            .collect()
    }

    /// A random graph: positions from [`GraphData::random_positions`] and
    /// `link_count` links between distinct points.
    pub fn random(point_count: usize, link_count: usize, space_size: f32, seed: u64) -> Self {
        let point_positions = Self::random_positions(point_count, space_size, seed);
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
        let mut links = Vec::with_capacity(link_count * 2);
        if point_count > 1 {
            while links.len() < link_count * 2 {
                let source = rng.random_range(0..point_count as u32);
                let target = rng.random_range(0..point_count as u32);
                if source != target {
                    links.extend([source, target]);
                }
            }
        }
        Self::new(point_positions, links)
    }

    /// Fill in random positions when none were supplied, sizing the graph
    /// from its highest link index.
    pub fn place_missing(&mut self, space_size: f32, seed: u64) {
        if !self.point_positions.is_empty() {
            return;
        }
        let point_count = self.links.iter().max().map_or(0, |&max| max as usize + 1);
        self.point_positions = Self::random_positions(point_count, space_size, seed);
    }

    pub fn point_count(&self) -> usize {
        self.point_positions.len() / 2
    }

    pub fn link_count(&self) -> usize {
        self.links.len() / 2
    }

    /// Positions as pairs.
    pub fn positions(&self) -> Vec<Position> {
        self.point_positions
            .chunks_exact(2)
            .map(|p| Position::new(p[0], p[1]))
            .collect()
    }

    /// Links as `(source, target)` pairs.
    pub fn link_pairs(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.links.chunks_exact(2).map(|l| (l[0], l[1]))
    }

    /// Number of links touching each point, counting both directions.
    pub fn degrees(&self) -> Vec<u32> {
        let mut degrees = vec![0u32; self.point_count()];
        for (source, target) in self.link_pairs() {
            degrees[source as usize] += 1;
            degrees[target as usize] += 1;
        }
        degrees
    }

    /// Pinned flag per point.
    pub fn pinned_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.point_count()];
        for &index in &self.pinned_points {
            if let Some(flag) = mask.get_mut(index as usize) {
                *flag = true;
            }
        }
        mask
    }

    /// Check array shapes and index ranges.
    pub fn validate(&self) -> Result<()> {
        if self.point_positions.len() % 2 != 0 {
            return Err(LayoutError::InvalidGraph(format!(
                "point positions must hold x,y pairs, got {} values",
                self.point_positions.len()
            )));
        }
        if self.links.len() % 2 != 0 {
            return Err(LayoutError::InvalidGraph(format!(
                "links must hold source,target pairs, got {} values",
                self.links.len()
            )));
        }

        let point_count = self.point_count();
        if let Some(&bad) = self.links.iter().find(|&&i| i as usize >= point_count) {
            return Err(LayoutError::InvalidGraph(format!(
                "link references point {} but only {} points exist",
                bad, point_count
            )));
        }
        if let Some(&bad) = self.pinned_points.iter().find(|&&i| i as usize >= point_count) {
            return Err(LayoutError::InvalidGraph(format!(
                "pinned point {} does not exist",
                bad
            )));
        }

        // Cluster ids address a texture sized by the largest id.
        if let Some(bad) = self
            .point_clusters
            .iter()
            .flatten()
            .flatten()
            .find(|&&id| id as usize >= point_count)
        {
            return Err(LayoutError::InvalidGraph(format!(
                "cluster id {} out of range, ids must be below the point count {}",
                bad, point_count
            )));
        }

        check_len("point_sizes", self.point_sizes.as_ref().map(Vec::len), point_count)?;
        check_len(
            "point_clusters",
            self.point_clusters.as_ref().map(Vec::len),
            point_count,
        )?;
        check_len(
            "cluster_strength",
            self.cluster_strength.as_ref().map(Vec::len),
            point_count,
        )?;
        check_len(
            "link_strength",
            self.link_strength.as_ref().map(Vec::len),
            self.link_count(),
        )?;

        Ok(())
    }
}

fn check_len(name: &str, len: Option<usize>, expected: usize) -> Result<()> {
    match len {
        Some(len) if len != expected => Err(LayoutError::InvalidGraph(format!(
            "{} has {} entries, expected {}",
            name, len, expected
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degrees_count_both_endpoints() {
        let graph = GraphData::new(vec![0.0; 8], vec![0, 1, 0, 2, 3, 0]);
        assert_eq!(graph.degrees(), vec![3, 1, 1, 1]);
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        assert!(GraphData::new(vec![0.0; 3], vec![]).validate().is_err());
        assert!(GraphData::new(vec![0.0; 4], vec![0]).validate().is_err());
        assert!(GraphData::new(vec![0.0; 4], vec![0, 2]).validate().is_err());

        let mut graph = GraphData::new(vec![0.0; 4], vec![0, 1]);
        graph.validate().unwrap();
        graph.link_strength = Some(vec![1.0, 2.0]);
        assert!(matches!(graph.validate(), Err(LayoutError::InvalidGraph(_))));
    }

    #[test]
    fn test_validate_bounds_cluster_ids() {
        let mut graph = GraphData::new(vec![0.0; 6], vec![]);
        graph.point_clusters = Some(vec![Some(2), None, Some(0)]);
        graph.validate().unwrap();

        graph.point_clusters = Some(vec![Some(3), None, Some(0)]);
        assert!(matches!(graph.validate(), Err(LayoutError::InvalidGraph(_))));

        graph.point_clusters = Some(vec![Some(u32::MAX), None, None]);
        let Err(LayoutError::InvalidGraph(message)) = graph.validate() else {
            panic!("huge cluster id accepted");
        };
        assert!(message.contains("cluster id"));
    }

    #[test]
    fn test_random_graph_has_valid_links() {
        let graph = GraphData::random(50, 80, 1000.0, 11);
        assert_eq!(graph.point_count(), 50);
        assert_eq!(graph.link_count(), 80);
        graph.validate().unwrap();
        assert!(graph.link_pairs().all(|(s, t)| s != t));
        assert_eq!(graph, GraphData::random(50, 80, 1000.0, 11));
        assert_eq!(GraphData::random(1, 5, 1000.0, 11).link_count(), 0);
    }

    #[test]
    fn test_place_missing_sizes_from_links() {
        let mut graph = GraphData::new(vec![], vec![0, 4, 2, 1]);
        graph.place_missing(100.0, 1);
        assert_eq!(graph.point_count(), 5);
        graph.validate().unwrap();

        let before = graph.point_positions.clone();
        graph.place_missing(100.0, 2);
        assert_eq!(graph.point_positions, before);
    }

    #[test]
    fn test_random_positions_are_deterministic_and_central() {
        let a = GraphData::random_positions(100, 1000.0, 7);
        let b = GraphData::random_positions(100, 1000.0, 7);
        assert_eq!(a, b);
        assert_eq!(a.len(), 200);
        assert!(a.iter().all(|&v| (250.0..=750.0).contains(&v)));
    }
}
