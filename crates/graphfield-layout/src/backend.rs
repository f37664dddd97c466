//! The seam between the simulation facade and where the state lives.

use crate::forces::cluster::ClusterState;
use crate::forces::link::LinkAdjacency;
use crate::forces::{ForceKind, ForceUniforms};
use crate::{Position, Result, Velocity};

/// Everything the point resource set is built from.
#[derive(Debug, Clone, Default)]
pub struct PointUpload {
    pub positions: Vec<Position>,
    pub pinned: Vec<bool>,
    /// Point diameter, already defaulted for points without one.
    pub sizes: Vec<f32>,
    /// Unit direction per point, used wherever two positions coincide.
    pub jitter: Vec<[f32; 2]>,
    /// Adjusted space size the quadtree levels are allocated for.
    pub space_size: f32,
}

/// A place to run the simulation: host memory or a GPU device.
///
/// Per-tick methods return nothing and do nothing while no point resources
/// exist. Only construction and readback can fail.
pub trait SimulationBackend {
    /// Human-readable backend name for logs.
    fn label(&self) -> &str;

    /// Largest space size this backend can hold quadtree levels for.
    fn max_space_size(&self) -> f32;

    /// Tear down and rebuild every per-point resource. An empty upload leaves
    /// the backend without resources.
    fn set_points(&mut self, points: &PointUpload) -> Result<()>;

    /// Replace both link directions.
    fn set_links(&mut self, outgoing: &LinkAdjacency, incoming: &LinkAdjacency) -> Result<()>;

    /// Replace cluster assignment.
    fn set_clusters(&mut self, clusters: &ClusterState) -> Result<()>;

    /// Replace pinned flags without rebuilding positions.
    fn set_pinned(&mut self, pinned: &[bool]);

    /// Zero the velocity accumulator.
    fn clear_velocity(&mut self);

    /// Run one force pass, adding into the velocity accumulator.
    fn run_force(&mut self, kind: ForceKind, uniforms: &ForceUniforms);

    /// Fold velocity accumulated since the last integration into positions.
    fn integrate(&mut self, uniforms: &ForceUniforms);

    /// Move the point `uniforms.drag_index` to `(drag_x, drag_y)`.
    fn drag(&mut self, uniforms: &ForceUniforms);

    /// Copy current positions to host memory.
    fn read_positions(&mut self) -> Result<Vec<Position>>;

    /// Copy the current velocity accumulator to host memory.
    fn read_velocities(&mut self) -> Result<Vec<Velocity>>;
}
