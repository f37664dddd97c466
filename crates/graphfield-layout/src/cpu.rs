//! Host-memory backend.
//!
//! Textures are plain vectors, accumulation is a literal scatter into
//! [`AccumulationBuffer`](crate::texture::AccumulationBuffer)s and many-body
//! repulsion walks the level pyramid with an explicit stack.

use crate::backend::{PointUpload, SimulationBackend};
use crate::forces::cluster::ClusterState;
use crate::forces::link::LinkAdjacency;
use crate::forces::{center, cluster, collision, gravity, link, many_body, mouse};
use crate::forces::{ForceKind, ForceUniforms};
use crate::quadtree::QuadtreeLevels;
use crate::store::PositionVelocityStore;
use crate::{Position, Result, Velocity};

/// Largest space the CPU backend allocates levels for.
pub const CPU_MAX_SPACE_SIZE: f32 = 65536.0;

#[derive(Debug, Default)]
pub struct CpuBackend {
    store: PositionVelocityStore,
    levels: Option<QuadtreeLevels>,
    sizes: Vec<f32>,
    jitter: Vec<[f32; 2]>,
    outgoing: LinkAdjacency,
    incoming: LinkAdjacency,
    clusters: ClusterState,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying store, for inspection.
    pub fn store(&self) -> &PositionVelocityStore {
        &self.store
    }

    /// The quadtree levels as of the last many-body pass.
    pub fn levels(&self) -> Option<&QuadtreeLevels> {
        self.levels.as_ref()
    }
}

impl SimulationBackend for CpuBackend {
    fn label(&self) -> &str {
        "cpu"
    }

    fn max_space_size(&self) -> f32 {
        CPU_MAX_SPACE_SIZE
    }

    fn set_points(&mut self, points: &PointUpload) -> Result<()> {
        self.store.resize(&points.positions, &points.pinned);
        if points.positions.is_empty() {
            self.levels = None;
            self.sizes.clear();
            self.jitter.clear();
            return Ok(());
        }
        self.levels = Some(QuadtreeLevels::new(points.space_size));
        self.sizes = points.sizes.clone();
        self.jitter = points.jitter.clone();
        tracing::info!(
            "cpu backend sized for {} points in space {}",
            points.positions.len(),
            points.space_size
        );
        Ok(())
    }

    fn set_links(&mut self, outgoing: &LinkAdjacency, incoming: &LinkAdjacency) -> Result<()> {
        self.outgoing = outgoing.clone();
        self.incoming = incoming.clone();
        Ok(())
    }

    fn set_clusters(&mut self, clusters: &ClusterState) -> Result<()> {
        self.clusters = clusters.clone();
        Ok(())
    }

    fn set_pinned(&mut self, pinned: &[bool]) {
        self.store.set_pinned(pinned);
    }

    fn clear_velocity(&mut self) {
        self.store.clear_velocity();
    }

    fn run_force(&mut self, kind: ForceKind, u: &ForceUniforms) {
        let Self {
            store,
            levels,
            sizes,
            jitter,
            outgoing,
            incoming,
            clusters,
        } = self;
        let Some(textures) = store.textures_mut() else {
            return;
        };
        let generation = textures.generation();
        let count = textures.layout().point_count();
        let (positions, velocity) = textures.split_mut();

        match kind {
            ForceKind::Mouse => mouse::apply(positions, velocity, u),
            ForceKind::Gravity => gravity::apply(positions, velocity, u),
            ForceKind::Center => {
                let aggregate = center::accumulate(positions, count);
                center::apply(positions, velocity, &aggregate, u);
            }
            ForceKind::ManyBody => {
                let Some(levels) = levels.as_mut() else {
                    return;
                };
                if levels.space_size() != u.space_size {
                    tracing::debug!("quadtree levels stale, skipping many-body pass");
                    levels.invalidate();
                    return;
                }
                levels.build(positions, count, generation);
                many_body::apply(positions, velocity, levels, jitter, u);
            }
            ForceKind::LinkOutgoing => link::apply(positions, velocity, outgoing, u),
            ForceKind::LinkIncoming => link::apply(positions, velocity, incoming, u),
            ForceKind::Cluster => {
                if clusters.is_empty() {
                    return;
                }
                let centroids = cluster::accumulate(positions, clusters, count);
                cluster::apply(positions, velocity, clusters, &centroids, u);
            }
            ForceKind::Collision => collision::apply(positions, velocity, sizes, jitter, u),
        }
    }

    fn integrate(&mut self, u: &ForceUniforms) {
        self.store.integrate(u.friction);
    }

    fn drag(&mut self, u: &ForceUniforms) {
        self.store
            .apply_drag(u.drag_index, Position::new(u.drag_x, u.drag_y));
    }

    fn read_positions(&mut self) -> Result<Vec<Position>> {
        Ok(self.store.positions())
    }

    fn read_velocities(&mut self) -> Result<Vec<Velocity>> {
        Ok(self.store.velocities())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(points: &[(f32, f32)]) -> PointUpload {
        PointUpload {
            positions: points.iter().map(|&(x, y)| Position::new(x, y)).collect(),
            pinned: vec![false; points.len()],
            sizes: vec![4.0; points.len()],
            jitter: vec![[1.0, 0.0]; points.len()],
            space_size: 256.0,
        }
    }

    #[test]
    fn test_unsized_backend_noops() {
        let mut backend = CpuBackend::new();
        let u = ForceUniforms::default();
        backend.clear_velocity();
        for kind in ForceKind::TICK_ORDER {
            backend.run_force(kind, &u);
        }
        backend.integrate(&u);
        backend.drag(&u);
        assert!(backend.read_positions().unwrap().is_empty());
    }

    #[test]
    fn test_many_body_builds_levels_for_current_points() {
        let mut backend = CpuBackend::new();
        backend
            .set_points(&upload(&[(10.0, 10.0), (200.0, 30.0), (90.0, 180.0)]))
            .unwrap();
        let u = ForceUniforms {
            point_count: 3,
            alpha: 1.0,
            repulsion: 1.0,
            theta: 1.0,
            space_size: 256.0,
            ..Default::default()
        };
        backend.clear_velocity();
        backend.run_force(ForceKind::ManyBody, &u);

        let levels = backend.levels().unwrap();
        assert_eq!(levels.len(), 8);
        assert!(levels.built_generation().is_some());
        for level in 0..levels.len() {
            assert_eq!(levels.total_count(level), 3.0);
        }
        let velocities = backend.read_velocities().unwrap();
        assert!(velocities.iter().all(|v| v.x != 0.0 || v.y != 0.0));
    }

    #[test]
    fn test_stale_levels_skip_many_body() {
        let mut backend = CpuBackend::new();
        backend.set_points(&upload(&[(10.0, 10.0), (20.0, 10.0)])).unwrap();
        let u = ForceUniforms {
            point_count: 2,
            alpha: 1.0,
            repulsion: 1.0,
            theta: 1.0,
            space_size: 512.0,
            ..Default::default()
        };
        backend.clear_velocity();
        backend.run_force(ForceKind::ManyBody, &u);
        assert!(backend.levels().unwrap().built_generation().is_none());
        let velocities = backend.read_velocities().unwrap();
        assert!(velocities.iter().all(|v| v.x == 0.0 && v.y == 0.0));
    }

    #[test]
    fn test_empty_upload_releases_resources() {
        let mut backend = CpuBackend::new();
        backend.set_points(&upload(&[(1.0, 1.0)])).unwrap();
        backend.set_points(&PointUpload::default()).unwrap();
        assert!(backend.levels().is_none());
        assert!(backend.store().textures().is_none());
    }
}
